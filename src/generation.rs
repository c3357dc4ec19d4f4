//! Text generation over retrieved conversation context.
//!
//! The [`Generator`] trait is the LLM seam: a prompt plus the texts pulled
//! out of the index by similarity search go in, a draft comes out.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use convo_sync_core::context::RecentContext;
use convo_sync_core::models::{IndexedMessage, MessageRecord};

use crate::config::{Credentials, GenerationConfig};
use crate::embedding::post_with_retry;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, retrieved_context: &[String]) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _retrieved_context: &[String]) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

/// Chat-completions generator.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    credentials: Credentials,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, credentials: Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            credentials,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, prompt: &str, retrieved_context: &[String]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system_message(retrieved_context) },
                { "role": "user", "content": prompt },
            ],
        });
        // Generation is not retried.
        let json = post_with_retry("OpenAI", 0, || {
            self.client
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(self.credentials.api_key())
                .json(&body)
        })
        .await?;
        parse_chat_response(&json)
    }
}

fn system_message(retrieved_context: &[String]) -> String {
    let mut out = String::from(
        "You help the user keep up a warm, natural conversation. \
         Use the past messages below as background; do not quote them verbatim.\n\n\
         Past messages:\n",
    );
    for line in retrieved_context {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(
            config,
            Credentials::from_env()?,
        )?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

fn describe(record: &MessageRecord) -> String {
    format!("{} {} [{}] {}", record.date, record.time, record.speaker, record.text.trim())
}

pub fn context_lines(hits: &[IndexedMessage]) -> Vec<String> {
    hits.iter().map(|h| describe(&h.record)).collect()
}

/// Prompt asking for a reply to the partner's latest message.
pub fn reply_prompt(recent: &RecentContext, partner: &str) -> Option<String> {
    let latest = recent.latest_partner.as_ref()?;
    let mut prompt = String::from("Recent conversation (newest first):\n");
    for r in &recent.recent {
        prompt.push_str(&describe(r));
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nDraft a reply to this message from {}:\n", partner));
    prompt.push_str(latest.text.trim());
    Some(prompt)
}

pub fn analysis_prompt(partner: &str) -> String {
    format!(
        "Based on the past messages, describe {}'s personality, interests, \
         and communication style, and suggest topics they would enjoy. \
         Quote the messages each observation rests on.",
        partner
    )
}

/// Prompt for a checklist of things both people want to do together.
pub fn wishlist_prompt(partner: &str) -> String {
    format!(
        "From the past messages, list the things {} and the user want to do \
         together: places to visit, food to try, activities, events, shared goals. \
         Use only what the messages actually say. \
         Answer as a Markdown checklist (\"- [ ] item\") under \"## \" headings, \
         phrased as a message the user could send. \
         If nothing qualifies, say that no shared plans were found.",
        partner
    )
}

/// Flatten Markdown into plain text suitable for pasting into a chat app.
///
/// `## h` becomes `✨h✨`, `### h` becomes `h`, checkboxes become `◯`/`✅`,
/// bold markers are dropped and runs of blank lines collapse to one.
pub fn to_plain_text(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in markdown.lines() {
        let line = if let Some(h) = line.strip_prefix("### ") {
            h.to_string()
        } else if let Some(h) = line.strip_prefix("## ") {
            format!("✨{}✨", h)
        } else {
            line.replace("- [ ] ", "◯ ").replace("- [x] ", "✅ ")
        };
        let line = line.replace("**", "");

        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
