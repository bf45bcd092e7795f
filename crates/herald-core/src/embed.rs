//! Rich reply payloads.

use serde::{Deserialize, Serialize};

/// Red used for error replies.
pub const ERROR_COLOR: u32 = 0xFF0000;

/// A rich reply with a title, body and accent color.
///
/// Platforms that cannot render embeds in a given channel should return
/// [`DeliveryError::Unsupported`](crate::error::DeliveryError::Unsupported)
/// so callers can fall back to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    /// Renders the embed as plain text for channels without embed support.
    pub fn to_plain_text(&self) -> String {
        match (&self.title, &self.description) {
            (Some(title), Some(body)) => format!("{title}\n{body}"),
            (Some(title), None) => title.clone(),
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        }
    }
}
