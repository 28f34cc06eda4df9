//! # In-Memory Record Store
//!
//! Metadata store over a process-local vector. Used by the development
//! profile and the test suite; semantics mirror the database store,
//! including uniqueness enforcement and keyword search.

use std::marker::PhantomData;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::{condition_matches, Entity, RecordStore};
use crate::model::{Aggregate, Condition, Query, StatQuery};

pub struct MemoryStore<T> {
    records: RwLock<Vec<T>>,
    _kind: PhantomData<T>,
}

impl<T> std::fmt::Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        MemoryStore {
            records: RwLock::new(Vec::new()),
            _kind: PhantomData,
        }
    }

    fn to_json(record: &T) -> Result<Value> {
        serde_json::to_value(record).map_err(|e| Error::internal(e.to_string()))
    }

    fn matches_all(json: &Value, conditions: &[Condition]) -> bool {
        conditions.iter().all(|c| condition_matches(json, c))
    }

    fn keyword_matches(json: &Value, keyword: &str) -> bool {
        T::SEARCH_FIELDS.iter().any(|field| {
            json.get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&keyword.to_lowercase()))
        })
    }

    fn check_unique(existing: &[T], candidate: &Value) -> Result<()> {
        for tuple in T::UNIQUE_FIELDS {
            for record in existing {
                let json = Self::to_json(record)?;
                let clash = tuple
                    .iter()
                    .all(|field| json.get(*field) == candidate.get(*field));
                if clash {
                    let name = candidate
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    return Err(Error::NameConflict { name });
                }
            }
        }
        Ok(())
    }

    fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        }
    }
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for MemoryStore<T> {
    async fn insert(&self, record: &T) -> Result<()> {
        let json = Self::to_json(record)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::internal("record store lock poisoned"))?;
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(Error::AlreadyExists {
                id: record.id().to_string(),
            });
        }
        Self::check_unique(&records, &json)?;
        records.push(record.clone());
        Ok(())
    }

    async fn find_one(&self, conditions: &[Condition]) -> Result<Option<T>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::internal("record store lock poisoned"))?;
        for record in records.iter() {
            if Self::matches_all(&Self::to_json(record)?, conditions) {
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    async fn replace(&self, record: &T) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::internal("record store lock poisoned"))?;
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, conditions: &[Condition]) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::internal("record store lock poisoned"))?;
        let mut matched = Vec::new();
        for (index, record) in records.iter().enumerate() {
            if Self::matches_all(&Self::to_json(record)?, conditions) {
                matched.push(index);
            }
        }
        for index in matched.iter().rev() {
            records.remove(*index);
        }
        Ok(!matched.is_empty())
    }

    async fn query(&self, query: &Query) -> Result<(Vec<T>, u64)> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::internal("record store lock poisoned"))?;

        let mut matched: Vec<(Value, T)> = Vec::new();
        for record in records.iter() {
            let json = Self::to_json(record)?;
            if !Self::matches_all(&json, &query.filter) {
                continue;
            }
            if let Some(keyword) = &query.keyword {
                if !Self::keyword_matches(&json, keyword) {
                    continue;
                }
            }
            matched.push((json, record.clone()));
        }

        if let Some(sort) = &query.sort {
            matched.sort_by(|(a, _), (b, _)| {
                let ordering = Self::compare(
                    a.get(&sort.key).unwrap_or(&Value::Null),
                    b.get(&sort.key).unwrap_or(&Value::Null),
                );
                if sort.desc {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = matched.len() as u64;
        let results = match query.page {
            Some(page) => matched
                .into_iter()
                .skip(page.start as usize)
                .take(page.limit as usize)
                .map(|(_, r)| r)
                .collect(),
            None => matched.into_iter().map(|(_, r)| r).collect(),
        };
        Ok((results, total))
    }

    async fn filter(&self, conditions: &[Condition]) -> Result<Vec<T>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::internal("record store lock poisoned"))?;
        let mut out = Vec::new();
        for record in records.iter() {
            if Self::matches_all(&Self::to_json(record)?, conditions) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    async fn stat(&self, query: &StatQuery) -> Result<Vec<Value>> {
        let matched = self.filter(&query.filter).await?;
        match &query.aggregate {
            Aggregate::Count { name } => {
                let mut row = serde_json::Map::new();
                row.insert(name.clone(), Value::from(matched.len() as u64));
                Ok(vec![Value::Object(row)])
            }
            Aggregate::Group { keys, count_name } => {
                let mut buckets: Vec<(Vec<(String, Value)>, u64)> = Vec::new();
                for record in &matched {
                    let json = Self::to_json(record)?;
                    let bucket_key: Vec<(String, Value)> = keys
                        .iter()
                        .map(|k| {
                            (
                                k.name.clone(),
                                json.get(&k.key).cloned().unwrap_or(Value::Null),
                            )
                        })
                        .collect();
                    match buckets.iter_mut().find(|(k, _)| *k == bucket_key) {
                        Some((_, count)) => *count += 1,
                        None => buckets.push((bucket_key, 1)),
                    }
                }
                Ok(buckets
                    .into_iter()
                    .map(|(key, count)| {
                        let mut row = serde_json::Map::new();
                        for (name, value) in key {
                            row.insert(name, value);
                        }
                        row.insert(count_name.clone(), Value::from(count));
                        Value::Object(row)
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CreateTrustedSecretParams, EncryptOptions, GroupKey, Page, ResourceGroup, Sort,
        TrustedSecret,
    };
    use serde_json::Map;

    fn trusted(name: &str, domain: &str) -> TrustedSecret {
        TrustedSecret::new(
            &CreateTrustedSecretParams::new(name, Map::new(), ResourceGroup::Domain),
            domain,
            None,
            None,
            false,
            EncryptOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let store = MemoryStore::new();
        let record = trusted("a", "d1");
        store.insert(&record).await.unwrap();
        let found = store
            .find_one(&[Condition::eq("trusted_secret_id", record.id())])
            .await
            .unwrap();
        assert_eq!(found.unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_unique_name_per_domain() {
        let store = MemoryStore::new();
        store.insert(&trusted("a", "d1")).await.unwrap();
        // Same name in another domain is fine.
        store.insert(&trusted("a", "d2")).await.unwrap();
        let err = store.insert(&trusted("a", "d1")).await.unwrap_err();
        assert_eq!(err.code(), "NAME_CONFLICT");
    }

    #[tokio::test]
    async fn test_replace_missing_record_reports_false() {
        let store = MemoryStore::new();
        let record = trusted("a", "d1");
        assert!(!store.replace(&record).await.unwrap());
        store.insert(&record).await.unwrap();
        let mut updated = record.clone();
        updated.name = "b".into();
        assert!(store.replace(&updated).await.unwrap());
        let found = store
            .find_one(&[Condition::eq("trusted_secret_id", record.id())])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "b");
    }

    #[tokio::test]
    async fn test_query_sort_page_and_total() {
        let store = MemoryStore::new();
        for name in ["c", "a", "b"] {
            store.insert(&trusted(name, "d1")).await.unwrap();
        }
        let (records, total) = store
            .query(&Query {
                filter: vec![Condition::eq("domain_id", "d1")],
                keyword: None,
                sort: Some(Sort {
                    key: "name".into(),
                    desc: false,
                }),
                page: Some(Page { start: 0, limit: 2 }),
            })
            .await
            .unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_query_keyword_search() {
        let store = MemoryStore::new();
        store.insert(&trusted("prod-db", "d1")).await.unwrap();
        store.insert(&trusted("staging-cache", "d1")).await.unwrap();
        let (records, total) = store
            .query(&Query {
                keyword: Some("DB".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].name, "prod-db");
    }

    #[tokio::test]
    async fn test_stat_group_by_domain() {
        let store = MemoryStore::new();
        store.insert(&trusted("a", "d1")).await.unwrap();
        store.insert(&trusted("b", "d1")).await.unwrap();
        store.insert(&trusted("c", "d2")).await.unwrap();
        let rows = store
            .stat(&StatQuery {
                filter: vec![],
                aggregate: Aggregate::Group {
                    keys: vec![GroupKey {
                        key: "domain_id".into(),
                        name: "domain".into(),
                    }],
                    count_name: "count".into(),
                },
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let d1 = rows
            .iter()
            .find(|r| r["domain"] == Value::String("d1".into()))
            .unwrap();
        assert_eq!(d1["count"], Value::from(2u64));
    }

    #[tokio::test]
    async fn test_remove_is_scoped() {
        let store = MemoryStore::new();
        let record = trusted("a", "d1");
        store.insert(&record).await.unwrap();
        // Wrong domain removes nothing.
        assert!(!store
            .remove(&[
                Condition::eq("trusted_secret_id", record.id()),
                Condition::eq("domain_id", "d2"),
            ])
            .await
            .unwrap());
        assert!(store
            .remove(&[
                Condition::eq("trusted_secret_id", record.id()),
                Condition::eq("domain_id", "d1"),
            ])
            .await
            .unwrap());
    }
}
