//! Typed signatures of the similarity query entry point.
//!
//! Two variants with the same name are distinct when their ordered
//! parameter types differ. That typed list is the variant's identity key
//! in the catalog.

use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;

use crate::database::sqlite::models::{EntryPointRow, NewEntryPoint, ParamSpec, ParamType};
use crate::search::request::{DEFAULT_CANDIDATE_CAP, DEFAULT_KIND};
use crate::{RecallError, Result};

pub const ENTRY_POINT_NAME: &str = "match_embeddings";

/// Version recorded for the canonical installation
pub const CANONICAL_VERSION: i64 = 1;

pub const PARAM_QUERY_VECTOR: &str = "query_vector";
pub const PARAM_USER_ID: &str = "match_user_id";
pub const PARAM_MODEL_TAG: &str = "match_model_tag";
pub const PARAM_KIND: &str = "match_kind";
pub const PARAM_THRESHOLD: &str = "match_threshold";
pub const PARAM_LIMIT: &str = "match_limit";
pub const PARAM_CANDIDATE_CAP: &str = "index_limit";

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<ParamSpec>,
}

impl Signature {
    #[inline]
    pub fn new(name: impl Into<String>, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// The one supported form: required parameters first, then optional
    /// ones in a fixed order with fixed defaults.
    #[inline]
    pub fn canonical() -> Self {
        Self::new(
            ENTRY_POINT_NAME,
            vec![
                ParamSpec::required(PARAM_QUERY_VECTOR, ParamType::Vector),
                ParamSpec::required(PARAM_USER_ID, ParamType::Text),
                ParamSpec::required(PARAM_MODEL_TAG, ParamType::Text),
                ParamSpec::optional(PARAM_KIND, ParamType::Text, json!(DEFAULT_KIND)),
                ParamSpec::optional(PARAM_THRESHOLD, ParamType::Real, json!(0.7)),
                ParamSpec::optional(PARAM_LIMIT, ParamType::Integer, Value::Null),
                ParamSpec::optional(
                    PARAM_CANDIDATE_CAP,
                    ParamType::Integer,
                    json!(DEFAULT_CANDIDATE_CAP),
                ),
            ],
        )
    }

    pub fn from_row(row: &EntryPointRow) -> Result<Self> {
        let params = row.parameter_specs().map_err(|e| {
            RecallError::Database(format!(
                "Invalid parameter list for {}: {}",
                row.signature, e
            ))
        })?;
        Ok(Self::new(&row.name, params))
    }

    /// Identity key, e.g. `match_embeddings(vector, text, text)`
    pub fn key(&self) -> String {
        let types: Vec<String> = self
            .params
            .iter()
            .map(|p| p.param_type.to_string())
            .collect();
        format!("{}({})", self.name, types.join(", "))
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
    }

    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Whether a call supplying exactly `supplied` would dispatch to this variant:
    /// every supplied name is declared and every required parameter is supplied.
    pub fn accepts(&self, supplied: &BTreeSet<&str>) -> bool {
        supplied.iter().all(|name| self.param(name).is_some())
            && self.required_names().all(|name| supplied.contains(name))
    }

    #[inline]
    pub fn to_new_entry_point(&self, version: i64) -> NewEntryPoint {
        NewEntryPoint {
            name: self.name.clone(),
            signature: self.key(),
            parameters: self.params.clone(),
            version,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", param.name, param.param_type)?;
            match &param.default {
                None => {}
                Some(Value::Null) => write!(f, " = NULL")?,
                Some(Value::String(s)) => write!(f, " = '{}'", s)?,
                Some(other) => write!(f, " = {}", other)?,
            }
        }
        write!(f, ")")
    }
}
