//! Token and cost quotas.
//!
//! Every provider call is appended to a usage ledger. Three calendar-aligned
//! windows (daily, weekly, monthly) cap the tokens and dollars spent in
//! their current period. Checks are hard gates: callers must not issue a
//! request the governor refused.

use crate::config::QuotaSettings;
use crate::error::{Result, TolkError};
use crate::llm::{price_for, MODELS_BY_PRICE};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Records older than this are pruned on every write.
const RETENTION_DAYS: i64 = 30;

/// Blended per-1K price for models missing from the price table.
const DEFAULT_PRICE_PER_1K: f64 = 0.01;

/// Quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Daily,
    Weekly,
    Monthly,
}

impl WindowType {
    pub const ALL: [WindowType; 3] = [WindowType::Daily, WindowType::Weekly, WindowType::Monthly];

    /// Length of one period.
    pub fn reset_interval(&self) -> Duration {
        match self {
            WindowType::Daily => Duration::seconds(86_400),
            WindowType::Weekly => Duration::seconds(604_800),
            WindowType::Monthly => Duration::seconds(2_592_000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Daily => "daily",
            WindowType::Weekly => "weekly",
            WindowType::Monthly => "monthly",
        }
    }

    /// Start of the period containing `now`, aligned to the Unix epoch.
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval_ms = self.reset_interval().num_milliseconds();
        let now_ms = now.timestamp_millis();
        DateTime::from_timestamp_millis(now_ms - now_ms.rem_euclid(interval_ms)).unwrap_or(now)
    }
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WindowType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(WindowType::Daily),
            "weekly" | "week" => Ok(WindowType::Weekly),
            "monthly" | "month" => Ok(WindowType::Monthly),
            _ => Err(format!("Unknown window: {}. Use daily, weekly, or monthly.", s)),
        }
    }
}

/// Token and cost ceilings of one window.
#[derive(Debug, Clone, Copy)]
pub struct QuotaWindow {
    pub window: WindowType,
    pub max_tokens: u64,
    pub max_cost: f64,
}

/// One provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub tokens: u64,
    pub cost: f64,
    pub model: String,
    pub task_type: String,
    /// blake3 of the analyzed content.
    pub content_hash: String,
}

/// Running totals for a model or task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

impl UsageAggregate {
    fn add(&mut self, tokens: u64, cost: f64) {
        self.tokens += tokens;
        self.cost += cost;
        self.requests += 1;
    }
}

/// Current state of one window.
#[derive(Debug, Clone)]
pub struct LimitStatus {
    pub window: WindowType,
    pub used_tokens: u64,
    pub used_cost: f64,
    pub max_tokens: u64,
    pub max_cost: f64,
    pub remaining_tokens: u64,
    pub remaining_cost: f64,
    pub token_ratio: f64,
    pub cost_ratio: f64,
    pub period_start: DateTime<Utc>,
    pub time_remaining: Duration,
}

/// Lifetime usage totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_requests: u64,
    pub by_model: BTreeMap<String, UsageAggregate>,
    pub by_task: BTreeMap<String, UsageAggregate>,
}

/// Average spend per request and per token.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostEfficiency {
    pub requests: u64,
    pub avg_tokens_per_request: f64,
    pub avg_cost_per_request: f64,
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    records: Vec<UsageRecord>,
    by_model: BTreeMap<String, UsageAggregate>,
    by_task: BTreeMap<String, UsageAggregate>,
}

/// Usage ledger with windowed limits.
pub struct QuotaGovernor {
    windows: Vec<QuotaWindow>,
    alert_threshold: f64,
    ledger_path: Option<PathBuf>,
    state: Mutex<Ledger>,
}

impl QuotaGovernor {
    pub fn new(settings: &QuotaSettings) -> Self {
        Self {
            windows: vec![
                QuotaWindow {
                    window: WindowType::Daily,
                    max_tokens: settings.daily_token_limit,
                    max_cost: settings.daily_cost_limit,
                },
                QuotaWindow {
                    window: WindowType::Weekly,
                    max_tokens: settings.weekly_token_limit,
                    max_cost: settings.weekly_cost_limit,
                },
                QuotaWindow {
                    window: WindowType::Monthly,
                    max_tokens: settings.monthly_token_limit,
                    max_cost: settings.monthly_cost_limit,
                },
            ],
            alert_threshold: settings.alert_threshold,
            ledger_path: None,
            state: Mutex::new(Ledger::default()),
        }
    }

    /// Persist the ledger at `path`, loading any existing records.
    pub fn with_ledger(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let mut ledger: Ledger = serde_json::from_str(&content)?;
            prune(&mut ledger.records, Utc::now());
            info!("Loaded {} usage records from {}", ledger.records.len(), path.display());
            self.state = Mutex::new(ledger);
        }
        self.ledger_path = Some(path);
        Ok(self)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.state
            .lock()
            .map_err(|e| TolkError::Lock(format!("Failed to acquire quota lock: {}", e)))
    }

    /// Ceilings of `window`.
    pub fn window(&self, window: WindowType) -> QuotaWindow {
        self.windows
            .iter()
            .copied()
            .find(|w| w.window == window)
            .unwrap_or(QuotaWindow {
                window,
                max_tokens: u64::MAX,
                max_cost: f64::INFINITY,
            })
    }

    /// Append a usage record.
    pub fn record_usage(
        &self,
        tokens: u64,
        cost: f64,
        model: &str,
        task_type: &str,
        content: &str,
    ) -> Result<()> {
        self.record_usage_at(Utc::now(), tokens, cost, model, task_type, content)
    }

    pub fn record_usage_at(
        &self,
        now: DateTime<Utc>,
        tokens: u64,
        cost: f64,
        model: &str,
        task_type: &str,
        content: &str,
    ) -> Result<()> {
        let mut state = self.lock()?;

        state.records.push(UsageRecord {
            timestamp: now,
            tokens,
            cost,
            model: model.to_string(),
            task_type: task_type.to_string(),
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
        });
        state.by_model.entry(model.to_string()).or_default().add(tokens, cost);
        state.by_task.entry(task_type.to_string()).or_default().add(tokens, cost);
        prune(&mut state.records, now);

        debug!(tokens, cost, model, task_type, "Recorded usage");

        for window in &self.windows {
            let (used_tokens, used_cost) = usage_in(&state.records, window.window, now);
            let token_ratio = ratio(used_tokens as f64, window.max_tokens as f64);
            let cost_ratio = ratio(used_cost, window.max_cost);
            if token_ratio >= self.alert_threshold || cost_ratio >= self.alert_threshold {
                warn!(
                    window = window.window.as_str(),
                    token_ratio,
                    cost_ratio,
                    "Usage is approaching the quota limit"
                );
            }
        }

        self.persist(&state);
        Ok(())
    }

    /// Whether a call of `tokens` and `cost` fits in the window's current period.
    pub fn check_limit(&self, tokens: u64, cost: f64, window: WindowType) -> Result<bool> {
        self.check_limit_at(Utc::now(), tokens, cost, window)
    }

    pub fn check_limit_at(
        &self,
        now: DateTime<Utc>,
        tokens: u64,
        cost: f64,
        window: WindowType,
    ) -> Result<bool> {
        let limits = self.window(window);
        let (used_tokens, used_cost) = {
            let state = self.lock()?;
            usage_in(&state.records, window, now)
        };

        Ok(used_tokens.saturating_add(tokens) <= limits.max_tokens
            && used_cost + cost <= limits.max_cost)
    }

    /// Like [`check_limit`](Self::check_limit) but fails with
    /// [`TolkError::QuotaExceeded`] describing the refused request.
    pub fn enforce(&self, tokens: u64, cost: f64, window: WindowType) -> Result<()> {
        let now = Utc::now();
        if self.check_limit_at(now, tokens, cost, window)? {
            return Ok(());
        }

        let status = self.limit_status_at(now, window)?;
        Err(TolkError::QuotaExceeded {
            window: window.to_string(),
            requested_tokens: tokens,
            requested_cost: cost,
            used_tokens: status.used_tokens,
            used_cost: status.used_cost,
            max_tokens: status.max_tokens,
            max_cost: status.max_cost,
        })
    }

    pub fn limit_status(&self, window: WindowType) -> Result<LimitStatus> {
        self.limit_status_at(Utc::now(), window)
    }

    pub fn limit_status_at(&self, now: DateTime<Utc>, window: WindowType) -> Result<LimitStatus> {
        let limits = self.window(window);
        let (used_tokens, used_cost) = {
            let state = self.lock()?;
            usage_in(&state.records, window, now)
        };
        let period_start = window.period_start(now);

        Ok(LimitStatus {
            window,
            used_tokens,
            used_cost,
            max_tokens: limits.max_tokens,
            max_cost: limits.max_cost,
            remaining_tokens: limits.max_tokens.saturating_sub(used_tokens),
            remaining_cost: (limits.max_cost - used_cost).max(0.0),
            token_ratio: ratio(used_tokens as f64, limits.max_tokens as f64),
            cost_ratio: ratio(used_cost, limits.max_cost),
            period_start,
            time_remaining: period_start + window.reset_interval() - now,
        })
    }

    /// Lifetime totals per model and per task.
    pub fn usage_stats(&self) -> Result<UsageStats> {
        let state = self.lock()?;
        let mut stats = UsageStats {
            by_model: state.by_model.clone(),
            by_task: state.by_task.clone(),
            ..UsageStats::default()
        };
        for aggregate in state.by_model.values() {
            stats.total_tokens += aggregate.tokens;
            stats.total_cost += aggregate.cost;
            stats.total_requests += aggregate.requests;
        }
        Ok(stats)
    }

    /// Snapshot of retained usage records.
    pub fn records(&self) -> Result<Vec<UsageRecord>> {
        Ok(self.lock()?.records.clone())
    }

    /// Forget usage.
    ///
    /// With a window, only records in that window's current period are
    /// removed. Without one, the whole ledger including aggregates is
    /// cleared. Returns the number of records removed.
    pub fn reset(&self, window: Option<WindowType>) -> Result<usize> {
        let mut state = self.lock()?;
        let before = state.records.len();

        match window {
            Some(w) => {
                let start = w.period_start(Utc::now());
                state.records.retain(|r| r.timestamp < start);
            }
            None => *state = Ledger::default(),
        }

        let removed = before - state.records.len();
        info!("Reset {} usage records", removed);
        self.persist(&state);
        Ok(removed)
    }

    /// Spend efficiency across all tasks, or for one task type.
    pub fn cost_efficiency(&self, task_type: Option<&str>) -> Result<CostEfficiency> {
        let state = self.lock()?;
        let (tokens, cost, requests) = state
            .records
            .iter()
            .filter(|r| task_type.map_or(true, |t| r.task_type == t))
            .fold((0u64, 0.0f64, 0u64), |(t, c, n), r| (t + r.tokens, c + r.cost, n + 1));

        if requests == 0 {
            return Ok(CostEfficiency::default());
        }

        Ok(CostEfficiency {
            requests,
            avg_tokens_per_request: tokens as f64 / requests as f64,
            avg_cost_per_request: cost / requests as f64,
            cost_per_1k_tokens: if tokens > 0 {
                cost / tokens as f64 * 1000.0
            } else {
                0.0
            },
        })
    }

    /// Estimated cost of `tokens` on `model` with an even input/output split.
    pub fn estimate_cost(&self, tokens: u64, model: &str) -> f64 {
        price_for(model)
            .map(|p| p.estimate(tokens, 0.5))
            .unwrap_or(tokens as f64 / 1000.0 * DEFAULT_PRICE_PER_1K)
    }

    /// First model, cheapest first, whose estimated cost for `tokens` fits
    /// `budget`. Falls back to the cheapest model.
    pub fn model_recommendation(&self, tokens: u64, budget: f64) -> &'static str {
        MODELS_BY_PRICE
            .iter()
            .copied()
            .find(|m| self.estimate_cost(tokens, m) <= budget)
            .unwrap_or(MODELS_BY_PRICE[0])
    }

    fn persist(&self, ledger: &Ledger) {
        let Some(path) = &self.ledger_path else {
            return;
        };
        let write = || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(ledger)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!("Failed to persist usage ledger to {}: {}", path.display(), e);
        }
    }
}

fn prune(records: &mut Vec<UsageRecord>, now: DateTime<Utc>) {
    let cutoff = now - Duration::days(RETENTION_DAYS);
    records.retain(|r| r.timestamp >= cutoff);
}

/// Tokens and cost recorded in `[period_start, now]`.
fn usage_in(records: &[UsageRecord], window: WindowType, now: DateTime<Utc>) -> (u64, f64) {
    let start = window.period_start(now);
    records
        .iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= now)
        .fold((0, 0.0), |(t, c), r| (t + r.tokens, c + r.cost))
}

fn ratio(used: f64, max: f64) -> f64 {
    if max > 0.0 {
        used / max
    } else {
        0.0
    }
}
