//! Field interpretation: send page text to the conversational extraction
//! service and parse the reply into [`PassportFields`].
//!
//! The network client is intentionally thin — wire types mirror the
//! upstream contract, the reply parser is a pure function, and all
//! normalization lives in [`crate::pipeline::normalize`] so it can change
//! without touching transport code.
//!
//! [`PageInterpreter`] is the seam the page pipeline works against; tests
//! substitute a stub implementation instead of spinning up a server.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::normalize;
use crate::record::PassportFields;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interprets one page of extracted text into passport fields.
///
/// `Ok(None)` means the upstream saw no actionable content on the page;
/// it is not an error and yields no record.
#[async_trait]
pub trait PageInterpreter: Send + Sync {
    async fn interpret(&self, page_text: &str) -> Result<Option<PassportFields>, IntakeError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    conversation_id: String,
    bot_id: &'a str,
    user: String,
    query: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    content: String,
}

/// Reply payload with the upstream's externally-defined field labels.
#[derive(Debug, Default, Deserialize)]
struct LabeledReply {
    #[serde(rename = "护照号码", default)]
    passport_number: Option<String>,
    #[serde(rename = "拼音姓", default)]
    surname: Option<String>,
    #[serde(rename = "拼音名", default)]
    given_name: Option<String>,
    #[serde(rename = "性别", default)]
    gender: Option<String>,
    #[serde(rename = "出生日期", default)]
    birth_date: Option<String>,
    #[serde(rename = "护照到期日", default)]
    expiry_date: Option<String>,
    #[serde(rename = "中文姓名", default)]
    chinese_name: Option<String>,
}

// ── Reply parsing (pure) ─────────────────────────────────────────────────────

static RE_REPLY_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```\s*$").unwrap());

/// Strip a fenced code block wrapping the reply, if present.
///
/// Models wrap structured replies in ` ```json … ``` ` fences often enough
/// that parsing must tolerate them; partially fenced replies (prefix or
/// suffix only) occur too.
fn strip_reply_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(caps) = RE_REPLY_FENCES.captures(trimmed) {
        return caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed);
    }
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_prefix
        .strip_suffix("```")
        .unwrap_or(without_prefix)
        .trim()
}

/// Parse a reply body into normalised [`PassportFields`].
fn parse_reply(content: &str) -> Result<PassportFields, IntakeError> {
    let body = strip_reply_fences(content);
    let labeled: LabeledReply =
        serde_json::from_str(body).map_err(|e| IntakeError::Upstream {
            detail: format!("reply is not parseable field data: {e}"),
        })?;

    let mut fields = PassportFields {
        passport_number: labeled.passport_number,
        surname: labeled.surname,
        given_name: labeled.given_name,
        gender: labeled.gender,
        birth_date: labeled.birth_date,
        expiry_date: labeled.expiry_date,
        chinese_name: labeled.chinese_name,
    };
    normalize::normalize_fields(&mut fields);
    Ok(fields)
}

/// Pick the assistant's final textual answer out of the message list.
fn final_answer(response: &ChatResponse) -> Option<&str> {
    response
        .messages
        .iter()
        .find(|m| m.role == "assistant" && m.kind == "answer" && m.content_type == "text")
        .map(|m| m.content.as_str())
        .filter(|c| !c.trim().is_empty())
}

// ── HTTP client ──────────────────────────────────────────────────────────────

/// [`PageInterpreter`] over the conversational extraction API.
///
/// Construct with [`new`](Self::new), then call [`probe`](Self::probe)
/// once (or use [`connect`](Self::connect) which does both);
/// [`interpret`](PageInterpreter::interpret) refuses to run until a probe
/// has succeeded.
#[derive(Debug)]
pub struct ChatInterpreter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    bot_id: String,
    probed: bool,
}

impl ChatInterpreter {
    /// Build a client from config without contacting the upstream.
    pub fn new(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| IntakeError::ServiceUnavailable {
                detail: "no API key configured (set PASSCHECK_API_KEY)".into(),
            })?;
        let bot_id = config
            .resolved_bot_id()
            .ok_or_else(|| IntakeError::ServiceUnavailable {
                detail: "no bot id configured (set PASSCHECK_BOT_ID)".into(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| IntakeError::ServiceUnavailable {
                detail: format!("HTTP client construction failed: {e}"),
            })?;

        Ok(Self {
            client,
            api_url: config.resolved_api_url(),
            api_key,
            bot_id,
            probed: false,
        })
    }

    /// Build a client and verify connectivity in one step.
    pub async fn connect(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let mut interpreter = Self::new(config)?;
        interpreter.probe().await?;
        Ok(interpreter)
    }

    /// One-shot connectivity check against the live endpoint.
    ///
    /// Until this has succeeded once, every `interpret` call fails with
    /// [`IntakeError::ServiceUnavailable`].
    pub async fn probe(&mut self) -> Result<(), IntakeError> {
        let response = self
            .send_query("connection probe")
            .await
            .map_err(|e| IntakeError::ServiceUnavailable {
                detail: e.to_string(),
            })?;
        if response.code != 0 {
            return Err(IntakeError::ServiceUnavailable {
                detail: format!(
                    "probe rejected with code {}: {}",
                    response.code,
                    response.msg.unwrap_or_default()
                ),
            });
        }
        info!(api_url = %self.api_url, "extraction service probe succeeded");
        self.probed = true;
        Ok(())
    }

    async fn send_query(&self, query: &str) -> Result<ChatResponse, IntakeError> {
        let request = ChatRequest {
            conversation_id: format!("conv_{}", uuid::Uuid::new_v4().simple()),
            bot_id: &self.bot_id,
            user: uuid::Uuid::new_v4().simple().to_string(),
            query,
            stream: false,
        };

        debug!(query_len = query.len(), "sending interpretation request");
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| IntakeError::Upstream {
                detail: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Upstream {
                detail: format!("HTTP {status}"),
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| IntakeError::Upstream {
                detail: format!("malformed response body: {e}"),
            })
    }
}

#[async_trait]
impl PageInterpreter for ChatInterpreter {
    async fn interpret(&self, page_text: &str) -> Result<Option<PassportFields>, IntakeError> {
        if !self.probed {
            return Err(IntakeError::ServiceUnavailable {
                detail: "connectivity probe has not succeeded".into(),
            });
        }

        let response = self.send_query(page_text).await?;
        if response.code != 0 {
            return Err(IntakeError::Upstream {
                detail: format!(
                    "upstream code {}: {}",
                    response.code,
                    response.msg.unwrap_or_default()
                ),
            });
        }

        let Some(content) = final_answer(&response) else {
            warn!("upstream returned no usable answer for page");
            return Ok(None);
        };

        parse_reply(content).map(Some)
    }
}
