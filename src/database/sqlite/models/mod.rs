
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One installed variant of an entry point, as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EntryPointRow {
    pub id: i64,
    pub name: String,
    /// Typed parameter list, e.g. `match_embeddings(vector, text, text)`
    pub signature: String,
    /// JSON array of [`ParamSpec`]
    pub parameters: String,
    pub version: i64,
    pub installed_at: NaiveDateTime,
}

impl EntryPointRow {
    #[inline]
    pub fn parameter_specs(&self) -> serde_json::Result<Vec<ParamSpec>> {
        serde_json::from_str(&self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntryPoint {
    pub name: String,
    pub signature: String,
    pub parameters: Vec<ParamSpec>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DependentRow {
    pub id: i64,
    pub entry_point_id: i64,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Vector,
    Text,
    Real,
    Integer,
}

impl std::fmt::Display for ParamType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ParamType::Vector => write!(f, "vector"),
            ParamType::Text => write!(f, "text"),
            ParamType::Real => write!(f, "real"),
            ParamType::Integer => write!(f, "integer"),
        }
    }
}

/// One declared parameter of an entry point variant.
///
/// A parameter without a default must be supplied by every caller. `Null`
/// is a valid default and means "unset" (for example, no result limit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub default: Option<Value>,
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only an absent field is `None`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ParamSpec {
    #[inline]
    pub fn required(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            default: None,
        }
    }

    #[inline]
    pub fn optional(name: &str, param_type: ParamType, default: Value) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            default: Some(default),
        }
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}
