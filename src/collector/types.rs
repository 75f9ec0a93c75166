//! Evidence captured for the Base tier.
//!
//! Evidence is opaque to the scheduler: it is compared byte-for-byte to decide
//! whether anything changed, then forwarded to the analysis service as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured evidence item (typically a screenshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// When the evidence was captured
    pub captured_at: DateTime<Utc>,
    /// MIME type of the payload
    pub media_type: String,
    /// Where the evidence came from (e.g. a file name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Raw payload bytes
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

impl Evidence {
    /// Create evidence captured now.
    pub fn new(media_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::captured_at(Utc::now(), media_type, payload)
    }

    /// Create evidence with an explicit capture time.
    pub fn captured_at(
        captured_at: DateTime<Utc>,
        media_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            captured_at,
            media_type: media_type.into(),
            origin: None,
            payload,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Whether the payload is byte-identical to another item's.
    pub fn same_payload(&self, other: &Evidence) -> bool {
        self.payload == other.payload
    }

    /// Guess a media type from a file extension.
    pub fn media_type_for_extension(ext: &str) -> &'static str {
        match ext.to_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

/// Payloads travel as base64 strings in JSON.
mod payload_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
