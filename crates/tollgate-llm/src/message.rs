//! Model call types
//!
//! These mirror the request/response objects the host framework passes to the
//! before/after model callbacks. The JSON shape follows Gemini's `generateContent`
//! wire format so recorded turns and live responses deserialize the same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one model call within a turn.
///
/// The host assigns it before the call and hands the same id to the request and
/// the response, so concurrent calls can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generate a fresh call id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One content part
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Text payload, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether this part is model reasoning ("thought") rather than answer text
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
}

impl Part {
    /// Plain text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: false,
        }
    }

    /// Thought part
    #[must_use]
    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: true,
        }
    }

    fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// A role-tagged list of parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Role (user, model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// User content with a single text part
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    /// Model content built from parts
    #[must_use]
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
        }
    }

    /// Concatenate the non-empty text parts with `sep`, `None` when there are none
    #[must_use]
    pub fn joined_text(&self, sep: &str) -> Option<String> {
        let texts: Vec<&str> = self.parts.iter().filter_map(Part::non_empty_text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(sep))
        }
    }
}

/// Usage counters as reported by the provider.
///
/// Every count is optional: providers omit fields they did not compute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Prompt (input) tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u64>,
    /// Candidate (output) tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u64>,
    /// Reasoning tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u64>,
    /// Tokens served from the context cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u64>,
    /// Total billed tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u64>,
}

/// Request passed to the before-model callback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Call identifier shared with the matching response
    #[serde(default)]
    pub call_id: CallId,
    /// Target model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation contents, last entry is the newest
    #[serde(default)]
    pub contents: Vec<Content>,
}

impl ModelRequest {
    /// Request for `model` with a single user prompt
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            call_id: CallId::new(),
            model: Some(model.into()),
            contents: vec![Content::user(prompt)],
        }
    }

    /// Text of the newest content entry, parts concatenated without separator
    #[must_use]
    pub fn last_text(&self) -> Option<String> {
        self.contents.last().and_then(|c| c.joined_text(""))
    }
}

/// Response passed to the after-model callback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    /// Call identifier shared with the originating request
    #[serde(default)]
    pub call_id: CallId,
    /// Generated content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Provider usage counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl ModelResponse {
    /// All text parts (thoughts included) joined by a blank line
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(|c| c.joined_text("\n\n"))
    }
}
