//! Static model price table (USD per 1K tokens).

/// Input and output price of a model per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPrice {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of a call with a known token split.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.input_per_1k
            + output_tokens as f64 / 1000.0 * self.output_per_1k
    }

    /// Cost of `tokens` assuming `input_ratio` of them are input tokens.
    pub fn estimate(&self, tokens: u64, input_ratio: f64) -> f64 {
        let input = tokens as f64 * input_ratio;
        let output = tokens as f64 - input;
        input / 1000.0 * self.input_per_1k + output / 1000.0 * self.output_per_1k
    }

    /// Price per 1K tokens for an even input/output split.
    pub fn blended_per_1k(&self) -> f64 {
        (self.input_per_1k + self.output_per_1k) / 2.0
    }
}

/// Known models, longest prefixes first so `gpt-4o-mini` wins over `gpt-4o`.
const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice::new(0.00015, 0.0006)),
    ("gpt-4o", ModelPrice::new(0.005, 0.015)),
    ("gpt-4-turbo", ModelPrice::new(0.01, 0.03)),
    ("gpt-4", ModelPrice::new(0.03, 0.06)),
    ("gpt-3.5-turbo", ModelPrice::new(0.0015, 0.002)),
    ("claude-3-haiku", ModelPrice::new(0.00025, 0.00125)),
    ("claude-3-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-3-5-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-3-opus", ModelPrice::new(0.015, 0.075)),
    ("glm-4-flash", ModelPrice::new(0.0005, 0.002)),
    ("glm-4-air", ModelPrice::new(0.001, 0.003)),
    ("glm-4v", ModelPrice::new(0.002, 0.006)),
    ("glm-4-vision", ModelPrice::new(0.002, 0.006)),
];

/// Models ordered by ascending blended price, for budget recommendations.
pub const MODELS_BY_PRICE: &[&str] = &[
    "gpt-4o-mini",
    "claude-3-haiku-20240307",
    "glm-4-flash",
    "gpt-3.5-turbo",
    "glm-4-air",
    "glm-4-vision",
    "claude-3-sonnet-20240229",
    "gpt-4o",
    "gpt-4-turbo",
    "claude-3-opus-20240229",
    "gpt-4",
];

/// Look up a model's price by longest matching prefix.
pub fn price_for(model: &str) -> Option<ModelPrice> {
    PRICES
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, price)| *price)
}
