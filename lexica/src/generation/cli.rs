//! Provider that shells out to the `claude` CLI

use super::{GenerationResult, PageGenerator};
use crate::error::GenerationError;
use async_trait::async_trait;
use lexica_kg::{EntityLink, PageMetadata};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Opus,
    Sonnet,
    Haiku,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Opus => "opus",
            Model::Sonnet => "sonnet",
            Model::Haiku => "haiku",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Sonnet
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opus" => Ok(Model::Opus),
            "sonnet" => Ok(Model::Sonnet),
            "haiku" => Ok(Model::Haiku),
            other => Err(format!("unknown model: {}", other)),
        }
    }
}

/// Generates pages by prompting the `claude` CLI in print mode and parsing
/// the JSON object in its answer
#[derive(Clone)]
pub struct CliGenerator {
    claude_path: PathBuf,
    working_dir: PathBuf,
    model: Model,
    name: String,
}

impl CliGenerator {
    pub fn new(model: Model) -> Self {
        Self {
            claude_path: PathBuf::from("claude"),
            working_dir: PathBuf::from("."),
            model,
            name: format!("claude-{}", model.as_str()),
        }
    }

    pub fn with_claude_path(mut self, path: PathBuf) -> Self {
        self.claude_path = path;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"Write a concise reference page about: {}

Mention related topics by name where they help the reader. For each topic you
mention that deserves its own page, add an entity link with a confidence of
"strong" (clearly central), "weak" (plausibly useful) or "ghost" (tangential).
Rate your own confidence in the page's accuracy between 0 and 1.

Respond with JSON only:
{{"title": "...", "content": "markdown body", "excerpt": "one or two sentences", "confidenceScore": 0.0, "entityLinks": [{{"entity": "...", "slug": "...", "confidence": "strong|weak|ghost"}}], "sourcesUsed": []}}"#,
            query
        )
    }

    fn parse_response(&self, response: &str) -> Result<GenerationResult, GenerationError> {
        // Extract the outermost JSON object; the model may wrap it in prose
        let json_str = match (response.find('{'), response.rfind('}')) {
            (Some(start), Some(end)) if end > start => &response[start..=end],
            _ => response,
        };

        let answer: CliAnswer =
            serde_json::from_str(json_str).map_err(|e| GenerationError::InvalidResponse {
                provider: self.name.clone(),
                message: e.to_string(),
            })?;

        if answer.title.trim().is_empty() || answer.content.trim().is_empty() {
            return Err(GenerationError::InvalidResponse {
                provider: self.name.clone(),
                message: "empty title or content".to_string(),
            });
        }

        Ok(GenerationResult {
            title: answer.title,
            content: answer.content,
            excerpt: answer.excerpt,
            confidence_score: answer.confidence_score,
            metadata: PageMetadata {
                sources_used: answer.sources_used,
                entity_links: answer.entity_links,
                provider: Some(self.name.clone()),
                ..Default::default()
            },
            published: true,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliAnswer {
    title: String,
    content: String,
    #[serde(default)]
    excerpt: String,
    #[serde(default = "default_confidence")]
    confidence_score: f64,
    #[serde(default)]
    entity_links: Vec<EntityLink>,
    #[serde(default)]
    sources_used: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

#[async_trait]
impl PageGenerator for CliGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, query: &str) -> Result<GenerationResult, GenerationError> {
        let mut cmd = Command::new(&self.claude_path);
        cmd.current_dir(&self.working_dir);
        cmd.arg("--print");
        cmd.arg("--model").arg(self.model.as_str());

        // Prompt must be the last positional argument
        cmd.arg(Self::build_prompt(query));

        // Close stdin so the CLI never waits for input
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running claude CLI ({}) for {:?}", self.model.as_str(), query);

        let output = cmd.output().await.map_err(|e| GenerationError::Provider {
            provider: self.name.clone(),
            message: format!("failed to execute claude CLI: {}", e),
        })?;

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(GenerationError::Provider {
                provider: self.name.clone(),
                message: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        if !stderr.is_empty() {
            tracing::warn!("claude stderr: {}", stderr);
        }

        self.parse_response(&response)
    }
}
