
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::database::Database;
use crate::database::sqlite::queries::{DependentQueries, EntryPointQueries};
use crate::schema::signature::{
    ENTRY_POINT_NAME, PARAM_CANDIDATE_CAP, PARAM_KIND, PARAM_LIMIT, PARAM_MODEL_TAG,
    PARAM_QUERY_VECTOR, PARAM_THRESHOLD, PARAM_USER_ID, Signature,
};
use crate::search::engine::{SimilarityEngine, SimilarityMatch};
use crate::search::request::SimilarityQuery;
use crate::{RecallError, Result};

/// Arguments of a call, keyed by parameter name
pub type NamedArgs = BTreeMap<String, Value>;

/// An installed variant together with its catalog id
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledVariant {
    pub id: i64,
    pub version: i64,
    pub signature: Signature,
}

/// Name-based dispatch over the installed variants of the entry point
#[derive(Debug, Clone)]
pub struct EntryPointRegistry {
    database: Database,
}

impl EntryPointRegistry {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Every installed variant, in installation order
    pub async fn variants(&self) -> Result<Vec<InstalledVariant>> {
        let rows = EntryPointQueries::list_by_name(self.database.pool(), ENTRY_POINT_NAME).await?;
        rows.iter()
            .map(|row| {
                Ok(InstalledVariant {
                    id: row.id,
                    version: row.version,
                    signature: Signature::from_row(row)?,
                })
            })
            .collect()
    }

    /// Install a variant without touching existing ones.
    ///
    /// This is how uncoordinated installers add overloads; it does not take
    /// the reconciliation lock.
    pub async fn install_variant(&self, signature: &Signature, version: i64) -> Result<i64> {
        let id =
            EntryPointQueries::insert(self.database.pool(), &signature.to_new_entry_point(version))
                .await?;
        debug!("Installed variant {} as id {}", signature.key(), id);
        Ok(id)
    }

    /// Bind an object (view, job, trigger) to a variant so it is removed with it
    pub async fn register_dependent(&self, entry_point_id: i64, name: &str) -> Result<i64> {
        Ok(DependentQueries::register(self.database.pool(), entry_point_id, name).await?)
    }

    /// Select the single variant a call with these argument names dispatches to
    pub async fn resolve(&self, args: &NamedArgs) -> Result<Signature> {
        let variants = self
            .variants()
            .await?
            .into_iter()
            .map(|v| v.signature)
            .collect();
        select_variant(variants, args)
    }

    /// Resolve, bind defaults and run the query
    pub async fn invoke(
        &self,
        engine: &SimilarityEngine,
        args: &NamedArgs,
    ) -> Result<Vec<SimilarityMatch>> {
        let signature = self.resolve(args).await?;
        let query = bind_query(&signature, args)?;
        engine.query(&query).await
    }
}

/// Pick the variant accepting `args`. No match is a caller error; more than
/// one is an ambiguous overload and never resolved by guessing.
pub fn select_variant(variants: Vec<Signature>, args: &NamedArgs) -> Result<Signature> {
    let supplied: BTreeSet<&str> = args.keys().map(String::as_str).collect();
    let mut matching: Vec<Signature> = variants
        .into_iter()
        .filter(|variant| variant.accepts(&supplied))
        .collect();

    match matching.len() {
        0 => Err(RecallError::InvalidQuery(format!(
            "no variant of {} accepts arguments ({})",
            ENTRY_POINT_NAME,
            supplied.into_iter().collect::<Vec<_>>().join(", ")
        ))),
        1 => Ok(matching.remove(0)),
        _ => Err(RecallError::InconsistentSchema {
            variants: matching.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// Turn named arguments plus the variant's defaults into a query.
///
/// Parameters the variant does not declare fall back to the built-in
/// defaults of [`SimilarityQuery::new`].
pub fn bind_query(signature: &Signature, args: &NamedArgs) -> Result<SimilarityQuery> {
    let mut query_vector = None;
    let mut owner_id = None;
    let mut model_tag = None;
    let mut kind = None;
    let mut threshold = None;
    let mut limit = None;
    let mut candidate_cap = None;

    for param in &signature.params {
        let name = param.name.as_str();
        let value = args
            .get(name)
            .or(param.default.as_ref())
            .ok_or_else(|| RecallError::InvalidQuery(format!("missing argument {}", name)))?;

        match name {
            PARAM_QUERY_VECTOR => query_vector = Some(vector_arg(name, value)?),
            PARAM_USER_ID => owner_id = Some(text_arg(name, value)?),
            PARAM_MODEL_TAG => model_tag = Some(text_arg(name, value)?),
            PARAM_KIND => kind = Some(text_arg(name, value)?),
            PARAM_THRESHOLD => threshold = Some(real_arg(name, value)?),
            PARAM_LIMIT => limit = Some(optional_count_arg(name, value)?),
            PARAM_CANDIDATE_CAP => candidate_cap = Some(count_arg(name, value)?),
            other => {
                return Err(RecallError::InvalidQuery(format!(
                    "{} declares unsupported parameter {}",
                    signature.key(),
                    other
                )));
            }
        }
    }

    let (Some(query_vector), Some(owner_id), Some(model_tag)) = (query_vector, owner_id, model_tag)
    else {
        return Err(RecallError::InvalidQuery(format!(
            "{} does not declare the vector, user and model parameters",
            signature.key()
        )));
    };

    let mut query = SimilarityQuery::new(query_vector, owner_id, model_tag);
    if let Some(kind) = kind {
        query = query.kind(kind);
    }
    if let Some(threshold) = threshold {
        query = query.threshold(threshold);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(candidate_cap) = candidate_cap {
        query = query.candidate_cap(candidate_cap);
    }
    Ok(query)
}

fn type_error(name: &str, expected: &str, value: &Value) -> RecallError {
    RecallError::InvalidQuery(format!("{} must be {}, got {}", name, expected, value))
}

fn vector_arg(name: &str, value: &Value) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| type_error(name, "an array of numbers", value))?;
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| type_error(name, "an array of numbers", value))
        })
        .collect()
}

fn text_arg(name: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| type_error(name, "a string", value))
}

fn real_arg(name: &str, value: &Value) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| type_error(name, "a number", value))
}

fn count_arg(name: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| type_error(name, "a non-negative integer", value))
}

fn optional_count_arg(name: &str, value: &Value) -> Result<Option<usize>> {
    if value.is_null() {
        Ok(None)
    } else {
        count_arg(name, value).map(Some)
    }
}
