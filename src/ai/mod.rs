use crate::config::Config;
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const PROMPT_SECTION: &str = "CODING_ANALYSIS";
const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes coding activity data and provides personalized insights and suggestions for improvement.";
const HEALTH_CHECK_PROMPT: &str =
    "Return exactly one short sentence indicating AI API connectivity is healthy.";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Reply,
}

#[derive(Debug, Deserialize)]
struct Reply {
    content: Option<String>,
}

impl CompletionResponse {
    /// First non-blank choice, trimmed.
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("AI response did not include message.content"))
    }
}

/// OpenAI-compatible `/chat/completions` endpoint with the key and timeout
/// from config baked in.
struct SummaryClient<'a> {
    http: Client,
    endpoint: String,
    model: &'a str,
}

impl<'a> SummaryClient<'a> {
    fn from_config(config: &'a Config) -> Result<Self> {
        let api_key = config.ai_api_key.as_deref().filter(|key| !key.trim().is_empty()).context(
            "AI API key is missing. Set `wakareport config set ai.api_key <KEY>` or `OPENAI_API_KEY`.",
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .context("AI API key is not a valid header value")?,
        );

        let http = Client::builder()
            .timeout(Duration::from_secs(config.ai_timeout_seconds.max(5)))
            .default_headers(headers)
            .build()
            .context("Failed to create AI HTTP client")?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                config.ai_api_base_url.trim_end_matches('/')
            ),
            model: &config.ai_model,
        })
    }

    fn ask(&self, system: &str, user: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("AI API request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("AI API error {status}: {body}");
        }

        response
            .json::<CompletionResponse>()
            .context("Failed to parse AI response")?
            .into_text()
    }
}

/// Summarizes a day log. `Ok(None)` when AI is disabled or no key is configured.
pub fn summarize_day_log(config: &Config, log_content: &str) -> Result<Option<String>> {
    if !config.ai_enabled || log_content.trim().is_empty() || !has_api_key(config) {
        return Ok(None);
    }

    let instructions = load_prompt(&config.prompts_path)?;
    let summary = SummaryClient::from_config(config)?
        .ask(SYSTEM_PROMPT, &format!("{instructions}\n\n{log_content}"))?;
    info!(chars = summary.len(), "day log summarized");

    Ok(Some(summary))
}

pub fn save_summary(summary_dir: &Path, date: NaiveDate, summary: &str) -> Result<PathBuf> {
    fs::create_dir_all(summary_dir).with_context(|| {
        format!(
            "Failed to create summary directory: {}",
            summary_dir.display()
        )
    })?;

    let path = summary_dir.join(format!("coding_summary_{}.txt", date.format("%Y-%m-%d")));
    fs::write(&path, summary)
        .with_context(|| format!("Failed to write summary: {}", path.display()))?;
    info!(path = %path.display(), "summary saved");

    Ok(path)
}

/// One-line round trip against the configured endpoint.
pub fn test_connection(config: &Config) -> Result<String> {
    SummaryClient::from_config(config)?.ask(HEALTH_CHECK_PROMPT, "Health check for wakareport.")
}

pub fn has_api_key(config: &Config) -> bool {
    config
        .ai_api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty())
}

fn load_prompt(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompts file: {}", path.display()))?;

    extract_prompt_section(&content, PROMPT_SECTION)
        .with_context(|| format!("Prompt section [{PROMPT_SECTION}] not found in {}", path.display()))
}

/// Text between `[name]` and the next `[` (or end of file), trimmed.
fn extract_prompt_section(content: &str, name: &str) -> Option<String> {
    let marker = format!("[{name}]");
    let start = content.find(&marker)? + marker.len();
    let rest = &content[start..];
    let body = rest.find('[').map_or(rest, |end| &rest[..end]).trim();

    (!body.is_empty()).then(|| body.to_string())
}
