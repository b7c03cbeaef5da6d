use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

pub const MAX_ORNAMENTS_PER_USER: usize = 5;
pub const CLEANUP_MINUTES: u32 = 30;
pub const DEFAULT_ORNAMENT_SIZE_PX: f64 = 120.0;
pub const ORNAMENT_HALF_EXTENT_PX: f64 = 60.0;
pub const FINGERPRINT_SRC_PREFIX_CHARS: usize = 100;

const EMBEDDED_IMAGE_PREFIX: &str = "data:";

/// A persisted ornament as served by the shared list.
///
/// Geometry is kept in the textual CSS form the client wrote (`"140px"`), since
/// the fingerprint is derived from that text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ornament {
    #[serde(default, deserialize_with = "css_text")]
    pub user_id: String,
    #[serde(default, deserialize_with = "css_text")]
    pub src: String,
    #[serde(default, deserialize_with = "css_text")]
    pub x: String,
    #[serde(default, deserialize_with = "css_text")]
    pub y: String,
    #[serde(default, deserialize_with = "css_text")]
    pub width: String,
    #[serde(default, deserialize_with = "css_text")]
    pub height: String,
    #[serde(default, deserialize_with = "css_text")]
    pub transform: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
}

impl Ornament {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::derive(&self.user_id, &self.x, &self.y, &self.src)
    }

    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// The image source to render, if it is an embedded payload.
    pub fn renderable_src(&self) -> Option<&str> {
        is_embedded_image(&self.src).then_some(self.src.as_str())
    }
}

pub fn is_embedded_image(src: &str) -> bool {
    src.starts_with(EMBEDDED_IMAGE_PREFIX)
}

/// Composite identity `userId_x_y_srcPrefix`. Not unique: two ornaments with the
/// same owner, position and image prefix share one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn derive(user_id: &str, x: &str, y: &str, src: &str) -> Self {
        let prefix: String = src.chars().take(FINGERPRINT_SRC_PREFIX_CHARS).collect();
        Self(format!("{user_id}_{x}_{y}_{prefix}"))
    }

    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveAction {
    #[serde(rename = "saveOrnament")]
    SaveOrnament,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageType {
    #[serde(rename = "base64")]
    Base64,
}

/// Body of `POST /api/ornaments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOrnamentRequest {
    pub action: SaveAction,
    pub user_id: String,
    pub src: String,
    pub x: String,
    pub y: String,
    pub width: String,
    pub height: String,
    pub transform: String,
    pub timestamp: i64,
    pub storage_type: StorageType,
}

impl SaveOrnamentRequest {
    /// The ornament this request will become once the list echoes it back.
    pub fn to_ornament(&self) -> Ornament {
        Ornament {
            user_id: self.user_id.clone(),
            src: self.src.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            width: self.width.clone(),
            height: self.height.clone(),
            transform: self.transform.clone(),
            timestamp: self.timestamp,
        }
    }
}

pub fn format_px(value: f64) -> String {
    format!("{value}px")
}

fn css_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct CssText;

    impl<'de> Visitor<'de> for CssText {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string, number or null")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(CssText)
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .unwrap_or(0),
        serde_json::Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map(|value| value as i64)
            .unwrap_or(0),
        _ => 0,
    })
}
