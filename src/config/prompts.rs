//! Prompt templates for Svar.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub qa: QaPrompts,
    pub expansion: ExpansionPrompts,
    pub rerank: RerankPrompts,
    pub grading: GradingPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for grounded answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaPrompts {
    pub system: String,
    pub user: String,
    /// Answer returned verbatim when retrieval produced no context.
    pub insufficient: String,
}

impl Default for QaPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an assistant that answers questions using only the provided transcript excerpts.

Guidelines:
- Answer strictly from the numbered context excerpts; never invent facts
- Cite sources inline with bracketed numbers [1], [2], [3] matching the excerpt numbers
- If the context does not contain the answer, say so honestly
- Be concise but complete; synthesize across excerpts when several are relevant"#
                .to_string(),

            user: r#"Use the following transcript excerpts to answer the question.
If the excerpts do not contain the answer, say so honestly.

Context:
{{context}}

Question: {{question}}

Answer (cite sources as [1], [2], ...):"#
                .to_string(),

            insufficient: "I could not find relevant information in the selected transcripts to answer this question."
                .to_string(),
        }
    }
}

/// Prompts for query expansion and multi-hop refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionPrompts {
    pub system: String,
    pub reformulate: String,
    pub hypothetical: String,
    pub refine: String,
}

impl Default for ExpansionPrompts {
    fn default() -> Self {
        Self {
            system: "You reformulate search queries while preserving their meaning.".to_string(),

            reformulate: r#"Rephrase the following question 2-3 different ways, keeping its meaning.

Question: {{question}}

Rephrasings (one per line, no numbering):"#
                .to_string(),

            hypothetical: r#"Write a brief hypothetical answer (1-2 sentences) to the question below.
The answer will be used as a search query to find relevant passages.

Question: {{question}}

Hypothetical answer:"#
                .to_string(),

            refine: r#"The excerpts below were retrieved for the question but may be incomplete.
Write one refined search query that would locate the missing information.
Return only the query text.

Question: {{question}}

Excerpts:
{{context}}

Refined query:"#
                .to_string(),
        }
    }
}

/// Prompts for reranking retrieved chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankPrompts {
    pub system: String,
    pub user: String,
}

impl Default for RerankPrompts {
    fn default() -> Self {
        Self {
            system: "You score how relevant text passages are for answering a question.".to_string(),

            user: r#"Score each passage for how well it helps answer the question.
Respond with a JSON array of objects: [{"index": 1, "score": 0.0}, ...]
where score is between 0.0 (irrelevant) and 1.0 (directly answers).

Question: {{question}}

Passages:
{{passages}}

JSON scores:"#
                .to_string(),
        }
    }
}

/// Prompts for judge-model quality grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingPrompts {
    pub groundedness_system: String,
    pub groundedness: String,
    pub completeness_system: String,
    pub completeness: String,
}

impl Default for GradingPrompts {
    fn default() -> Self {
        Self {
            groundedness_system: "You judge whether the facts in an answer are supported by the provided context.".to_string(),

            groundedness: r#"Rate how well the facts in the answer are supported by the context.
Return a single number from 0.0 to 1.0, where 1.0 means every fact is supported
and 0.0 means the answer contains many unsupported claims.

Context:
{{context}}

Answer:
{{answer}}

Groundedness score (number only):"#
                .to_string(),

            completeness_system: "You judge how completely an answer addresses a question.".to_string(),

            completeness: r#"Rate how completely the answer covers every part of the question.
Return a single number from 0.0 to 1.0, where 1.0 is a complete answer.

Question: {{question}}

Answer: {{answer}}

Completeness score (number only):"#
                .to_string(),
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

            let qa_path = custom_path.join("qa.toml");
            if qa_path.exists() {
                let content = std::fs::read_to_string(&qa_path)?;
                prompts.qa = toml::from_str(&content)?;
            }

            let expansion_path = custom_path.join("expansion.toml");
            if expansion_path.exists() {
                let content = std::fs::read_to_string(&expansion_path)?;
                prompts.expansion = toml::from_str(&content)?;
            }

            let rerank_path = custom_path.join("rerank.toml");
            if rerank_path.exists() {
                let content = std::fs::read_to_string(&rerank_path)?;
                prompts.rerank = toml::from_str(&content)?;
            }

            let grading_path = custom_path.join("grading.toml");
            if grading_path.exists() {
                let content = std::fs::read_to_string(&grading_path)?;
                prompts.grading = toml::from_str(&content)?;
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

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.qa.system.is_empty());
        assert!(!prompts.expansion.reformulate.is_empty());
        assert!(prompts.qa.user.contains("{{question}}"));
        assert!(prompts.qa.user.contains("{{context}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = std::collections::HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }
}
