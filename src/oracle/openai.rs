//! OpenAI-compatible vision oracle: one non-streaming chat completion per
//! decision, screenshot attached as a base64 image part, response parsed
//! strictly into an [`Action`].

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::Engine as _;
use regex::Regex;

use crate::agent::state::Action;
use crate::config::OracleConfig;
use crate::errors::{WebClawError, WebClawResult};
use crate::oracle::{DecisionOracle, DecisionRequest};
use crate::perception::marker::element_list_text;

const SYSTEM_PROMPT: &str = "\
You are WebClaw, a browser automation agent. You control a web browser to \
complete the user's task.

On the screenshot, interactive elements are marked with numbered coloured \
badges. Analyse the screenshot and decide the single next action.

RULES:
1. Use ONLY element numbers that are visible on the screenshot
2. Never invent elements or numbers
3. Use goto to open a site, done when the task is complete, ask when you \
need information from the user, wait while the page is loading
4. After typing into a search field, press Enter to submit

Reply with ONLY valid JSON (no markdown, no ```):

{\"action\": \"goto\", \"url\": \"https://example.com\", \"thought\": \"why\"}
{\"action\": \"click\", \"element\": 5, \"thought\": \"why\"}
{\"action\": \"type\", \"element\": 3, \"text\": \"query\", \"thought\": \"why\"}
{\"action\": \"press\", \"key\": \"Enter\", \"thought\": \"why\"}
{\"action\": \"scroll\", \"direction\": \"down\", \"thought\": \"why\"}
{\"action\": \"wait\", \"thought\": \"why\"}
{\"action\": \"done\", \"result\": \"what was achieved\"}
{\"action\": \"ask\", \"question\": \"question for the user\"}";

pub struct OpenAiOracle {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiOracle {
    pub fn from_config(cfg: &OracleConfig) -> WebClawResult<Self> {
        Ok(Self {
            api_base: cfg.api_base.clone(),
            api_key: cfg.resolve_api_key()?,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn decide(&self, request: DecisionRequest<'_>) -> WebClawResult<Action> {
        let screenshot_b64 =
            base64::engine::general_purpose::STANDARD.encode(&request.observation.screenshot_png);

        let user_text = format!(
            "Task: {goal}\n\nCurrent URL: {url}\n{history}\n{elements}\n\n\
             Look at the screenshot and decide the next action.",
            goal = request.goal,
            url = request.observation.url,
            history = request.history_text,
            elements = element_list_text(&request.observation.elements),
        );

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/png;base64,{screenshot_b64}"),
                                "detail": "high",
                            },
                        },
                        { "type": "text", "text": user_text },
                    ],
                },
            ],
        });

        tracing::debug!(
            model = %self.model,
            elements = request.observation.elements.len(),
            image_bytes = request.observation.screenshot_png.len(),
            "sending oracle request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(WebClawError::Oracle(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        let (action, thought) = parse_action(&content)?;
        if let Some(thought) = thought {
            tracing::info!(action = %action.describe(), thought = %thought, "oracle decision");
        } else {
            tracing::info!(action = %action.describe(), "oracle decision");
        }
        Ok(action)
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*").unwrap())
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Strictly parse the oracle's reply into an [`Action`], tolerating only
/// format noise: markdown fences around the JSON, or prose around a single
/// JSON object. Returns the action and the optional `thought` field.
pub fn parse_action(text: &str) -> WebClawResult<(Action, Option<String>)> {
    if let Some(parsed) = try_parse_object(text) {
        return Ok(parsed);
    }

    let cleaned = fence_re().replace_all(text, "");
    if let Some(parsed) = try_parse_object(cleaned.trim()) {
        return Ok(parsed);
    }

    if let Some(m) = object_re().find(&cleaned) {
        if let Some(parsed) = try_parse_object(m.as_str()) {
            return Ok(parsed);
        }
    }

    let snippet: String = text.chars().take(200).collect();
    Err(WebClawError::OracleParse(format!(
        "unrecognised oracle reply: {snippet}"
    )))
}

fn try_parse_object(text: &str) -> Option<(Action, Option<String>)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let thought = value
        .get("thought")
        .and_then(|t| t.as_str())
        .map(|t| t.to_string());
    let action: Action = serde_json::from_value(value).ok()?;
    Some((action, thought))
}
