//! AAC communication-board button customization

use serde::{Deserialize, Serialize};

use super::payload::{require_text, CollectionPayload};
use crate::error::{Error, Result};

/// Upper bound on inline image data (data URLs are stored in the payload)
const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// A user customization of one button on an AAC board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AacButton {
    /// Text shown on the button
    pub label: String,
    /// Phrase spoken when pressed (defaults to the label)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
    /// Custom picture as a `data:` URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Background color, e.g. `#ffcc00`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Hidden buttons stay customized but are not shown on the board
    #[serde(default)]
    pub hidden: bool,
}

impl AacButton {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            speech: None,
            image: None,
            color: None,
            hidden: false,
        }
    }

    /// The phrase to speak for this button
    pub fn spoken_text(&self) -> &str {
        self.speech.as_deref().unwrap_or(&self.label)
    }
}

impl CollectionPayload for AacButton {
    const COLLECTION: &'static str = "aac_buttons";

    fn validate(&self) -> Result<()> {
        require_text(&self.label, "label")?;
        if let Some(image) = &self.image {
            if !image.starts_with("data:image/") {
                return Err(Error::InvalidInput(
                    "image must be a data:image/... URL".to_string(),
                ));
            }
            if image.len() > MAX_IMAGE_BYTES {
                return Err(Error::InvalidInput(format!(
                    "image exceeds {MAX_IMAGE_BYTES} bytes"
                )));
            }
        }
        if let Some(color) = &self.color {
            let hex = color.strip_prefix('#').unwrap_or_default();
            if !(hex.len() == 6 || hex.len() == 3) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::InvalidInput(format!("invalid color '{color}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spoken_text_falls_back_to_label() {
        let mut button = AacButton::new("Drink");
        assert_eq!(button.spoken_text(), "Drink");
        button.speech = Some("I want a drink".to_string());
        assert_eq!(button.spoken_text(), "I want a drink");
    }

    #[test]
    fn validate_checks_image_and_color() {
        let mut button = AacButton::new("Play");
        button.color = Some("#1a2b3c".to_string());
        button.image = Some("data:image/png;base64,AAAA".to_string());
        assert!(button.validate().is_ok());

        button.color = Some("blue".to_string());
        assert!(button.validate().is_err());

        button.color = None;
        button.image = Some("https://example.com/cat.png".to_string());
        assert!(button.validate().is_err());
    }
}
