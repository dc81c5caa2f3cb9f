//! Prompt templates for Tolk.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    /// Full structured analysis of one chunk.
    pub analysis: PromptPair,
    /// Consolidation of several chunk summaries.
    pub merge: MergePrompts,
    /// Single-task prompts.
    pub tasks: TaskPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// A system/user prompt pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    fn new(system: &str, user: &str) -> Self {
        Self {
            system: system.to_string(),
            user: user.to_string(),
        }
    }
}

impl Default for PromptPair {
    fn default() -> Self {
        Self::new(
            r#"You are a professional content analyst. Analyze the given transcript excerpt and return the result as a single JSON object.

The JSON object must contain these fields:
- "summary": a concise summary of the content (100-200 characters)
- "key_points": an array of 5-10 key points
- "categories": an array of content categories (e.g. technology, education, entertainment)
- "tags": an array of 10-15 relevant tags
- "knowledge_entries": an array of knowledge entries, each with:
  - "title": short title of the entry
  - "content": detailed explanation
  - "type": one of "concept", "fact", "method", "tip"
  - "importance": integer from 1 (trivial) to 5 (essential)
  - "tags": array of related tags

Guidelines:
1. The summary captures the core content without filler
2. Key points are representative and informative
3. Categories reflect the actual subject matter
4. Tags cover the main keywords
5. Knowledge entries are structured and practically useful
6. Respond in the language of the transcript
7. Output only the JSON object"#,
            "Analyze the following content:\n\n{{content}}",
        )
    }
}

/// Prompts for merging chunk summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePrompts {
    pub system: String,
    pub user: String,
}

impl Default for MergePrompts {
    fn default() -> Self {
        Self {
            system: "You are a professional editor who consolidates several texts into one, keeping their core information.".to_string(),
            user: r#"Merge the following summaries into one coherent summary:

Summaries:
{{summaries}}

Requirements:
1. Keep the core information complete
2. Remove repeated content
3. Keep the logic coherent and the structure clear
4. Stay between 200 and 300 characters
5. Return only the merged summary, nothing else"#
                .to_string(),
        }
    }
}

/// Prompts for the single-task operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPrompts {
    pub summary: PromptPair,
    pub key_points: PromptPair,
    pub categories: PromptPair,
    pub tags: PromptPair,
}

impl Default for TaskPrompts {
    fn default() -> Self {
        Self {
            summary: PromptPair::new(
                "You are a professional summarization assistant. Write a concise summary (100-200 characters) of the given text. Capture the core content and main points, stay objective, avoid redundancy. Respond in the language of the text and return only the summary.",
                "Summarize the following content:\n\n{{content}}",
            ),
            key_points: PromptPair::new(
                "You are a professional content analyst. Extract 5-10 key points from the given text. Each point is short and carries important information. Return a JSON object {\"key_points\": [...]}.",
                "Extract the key points of the following content:\n\n{{content}}",
            ),
            categories: PromptPair::new(
                "You are a professional content classifier. Give the 3-5 most relevant categories for the given text, neither too broad nor too specific. Return a JSON object {\"categories\": [...]}.",
                "Categorize the following content:\n\n{{content}}",
            ),
            tags: PromptPair::new(
                "You are a professional tagging assistant. Generate 10-15 short, accurate, representative tags for the given text. Return a JSON object {\"tags\": [...]}.",
                "Generate tags for the following content:\n\n{{content}}",
            ),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let analysis_path = custom_path.join("analysis.toml");
            if analysis_path.exists() {
                let content = std::fs::read_to_string(&analysis_path)?;
                prompts.analysis = toml::from_str(&content)?;
            }

            let merge_path = custom_path.join("merge.toml");
            if merge_path.exists() {
                let content = std::fs::read_to_string(&merge_path)?;
                prompts.merge = toml::from_str(&content)?;
            }

            let tasks_path = custom_path.join("tasks.toml");
            if tasks_path.exists() {
                let content = std::fs::read_to_string(&tasks_path)?;
                prompts.tasks = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.analysis.system.contains("knowledge_entries"));
        assert!(prompts.analysis.user.contains("{{content}}"));
        assert!(prompts.merge.user.contains("{{summaries}}"));
        assert!(prompts.tasks.tags.user.contains("{{content}}"));
    }

    #[test]
    fn test_render_with_custom_precedence() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("audience".to_string(), "students".to_string());
        prompts.variables.insert("content".to_string(), "ignored".to_string());

        let mut vars = HashMap::new();
        vars.insert("content".to_string(), "the transcript".to_string());

        let rendered = prompts.render_with_custom("For {{audience}}: {{content}}", &vars);
        assert_eq!(rendered, "For students: the transcript");
    }

    #[test]
    fn test_load_custom_merge_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("merge.toml"),
            "system = \"Merge carefully.\"\nuser = \"{{summaries}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.merge.system, "Merge carefully.");
        assert_eq!(prompts.analysis.user, PromptPair::default().user);
    }
}
