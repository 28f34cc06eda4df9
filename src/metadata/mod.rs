//! # Metadata Store
//!
//! Typed record store for the secret record kinds. The store is generic over
//! an [`Entity`]: each record kind declares its collection, id field, indexed
//! fields, uniqueness tuples, and keyword-search fields, and the store
//! implementations translate the shared query model against that shape.
//!
//! Two implementations exist: [`mongo::MongoStore`] over the configured
//! database, and [`memory::MemoryStore`] for the development profile and the
//! test suite.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Condition, FilterOp, Query, StatQuery};

/// Shape description of a record kind persisted by the metadata store.
pub trait Entity:
    Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static
{
    /// Human-readable resource name used in error messages.
    const RESOURCE: &'static str;
    /// Collection (table) name.
    const COLLECTION: &'static str;
    /// Field holding the generated, immutable id.
    const ID_FIELD: &'static str;
    /// Fields that must be indexed.
    const INDEX_FIELDS: &'static [&'static str];
    /// Field tuples enforced unique by the store.
    const UNIQUE_FIELDS: &'static [&'static [&'static str]];
    /// Fields searched by the listing keyword.
    const SEARCH_FIELDS: &'static [&'static str];

    fn id(&self) -> &str;
}

/// Uniform contract of the metadata store.
#[async_trait]
pub trait RecordStore<T: Entity>: Send + Sync {
    /// Insert a new record. Fails with a name conflict when a configured
    /// uniqueness tuple is violated.
    async fn insert(&self, record: &T) -> Result<()>;

    /// First record matching all conditions.
    async fn find_one(&self, conditions: &[Condition]) -> Result<Option<T>>;

    /// Replace the stored record with the same id. Returns `false` when the
    /// record no longer exists; callers racing a delete decide whether that
    /// is an error.
    async fn replace(&self, record: &T) -> Result<bool>;

    /// Remove records matching all conditions; `true` if anything went.
    async fn remove(&self, conditions: &[Condition]) -> Result<bool>;

    /// Filtered, keyword-searched, sorted, paged listing plus the total
    /// count before paging.
    async fn query(&self, query: &Query) -> Result<(Vec<T>, u64)>;

    /// All records matching the conditions, unsorted and unpaged.
    async fn filter(&self, conditions: &[Condition]) -> Result<Vec<T>>;

    /// Aggregation over the matching records.
    async fn stat(&self, query: &StatQuery) -> Result<Vec<Value>>;
}

/// Fetch a record by id within the given scope conditions, or `NOT_FOUND`.
pub async fn get_scoped<T: Entity>(
    store: &dyn RecordStore<T>,
    id: &str,
    scope: &[Condition],
) -> Result<T> {
    let mut conditions = vec![Condition::eq(T::ID_FIELD, id)];
    conditions.extend_from_slice(scope);
    store
        .find_one(&conditions)
        .await?
        .ok_or_else(|| Error::not_found(T::RESOURCE, id))
}

/// Delete a record by id within the given scope conditions, or `NOT_FOUND`.
pub async fn remove_scoped<T: Entity>(
    store: &dyn RecordStore<T>,
    id: &str,
    scope: &[Condition],
) -> Result<()> {
    let mut conditions = vec![Condition::eq(T::ID_FIELD, id)];
    conditions.extend_from_slice(scope);
    if store.remove(&conditions).await? {
        Ok(())
    } else {
        Err(Error::not_found(T::RESOURCE, id))
    }
}

/// Evaluate one condition against the JSON projection of a record.
/// Missing fields compare as JSON null.
pub(crate) fn condition_matches(record: &Value, cond: &Condition) -> bool {
    let field = record.get(&cond.key).unwrap_or(&Value::Null);
    match cond.op {
        FilterOp::Eq => field == &cond.value,
        FilterOp::Not => field != &cond.value,
        FilterOp::In => match &cond.value {
            Value::Array(candidates) => candidates.iter().any(|v| v == field),
            single => single == field,
        },
        FilterOp::Contains => match (field.as_str(), cond.value.as_str()) {
            (Some(hay), Some(needle)) => {
                hay.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_matches_eq_and_not() {
        let record = json!({"domain_id": "d1", "name": "a"});
        assert!(condition_matches(&record, &Condition::eq("domain_id", "d1")));
        assert!(!condition_matches(&record, &Condition::eq("domain_id", "d2")));
        assert!(condition_matches(&record, &Condition::not("name", "b")));
    }

    #[test]
    fn test_condition_matches_in_with_wildcard() {
        let record = json!({"project_id": "*"});
        let cond = Condition::any_of("project_id", vec!["p2".into(), "*".into()]);
        assert!(condition_matches(&record, &cond));

        let record = json!({"project_id": "p1"});
        assert!(!condition_matches(&record, &cond));
    }

    #[test]
    fn test_condition_matches_contains_case_insensitive() {
        let record = json!({"name": "Database-Credentials"});
        assert!(condition_matches(
            &record,
            &Condition::contains("name", "credential")
        ));
    }

    #[test]
    fn test_missing_field_compares_as_null() {
        let record = json!({"name": "a"});
        assert!(condition_matches(
            &record,
            &Condition::eq("trusted_secret_id", Value::Null)
        ));
    }
}
