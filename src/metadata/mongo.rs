//! # MongoDB Record Store
//!
//! Metadata store over a MongoDB collection per record kind. Conditions are
//! translated to filter documents, keyword search to an `$or` of anchored
//! case-insensitive regexes over the kind's search fields, and `stat` to an
//! aggregation pipeline. Declared indexes are created at startup; uniqueness
//! tuples become unique compound indexes and duplicate-key write errors are
//! reported as name conflicts.

use std::marker::PhantomData;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, to_document, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::{Entity, RecordStore};
use crate::model::{Aggregate, Condition, FilterOp, Query, StatQuery};

pub struct MongoStore<T> {
    collection: Collection<Document>,
    _kind: PhantomData<T>,
}

impl<T> std::fmt::Debug for MongoStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("collection", &self.collection.name())
            .finish_non_exhaustive()
    }
}

fn db_err(err: mongodb::error::Error) -> Error {
    Error::UpstreamUnavailable {
        service: "database",
        message: err.to_string(),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000
    )
}

/// Escape regex metacharacters so a keyword is matched literally.
fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if ".^$*+?()[]{}|\\".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn condition_to_document(cond: &Condition) -> Result<Document> {
    let value = to_bson(&cond.value).map_err(|e| Error::internal(e.to_string()))?;
    let clause = match cond.op {
        FilterOp::Eq => value,
        FilterOp::Not => Bson::Document(doc! { "$ne": value }),
        FilterOp::In => {
            let candidates = match value {
                Bson::Array(array) => Bson::Array(array),
                single => Bson::Array(vec![single]),
            };
            Bson::Document(doc! { "$in": candidates })
        }
        FilterOp::Contains => {
            let needle = cond.value.as_str().unwrap_or_default();
            Bson::Document(doc! { "$regex": escape_regex(needle), "$options": "i" })
        }
    };
    let mut document = Document::new();
    document.insert(cond.key.clone(), clause);
    Ok(document)
}

fn filter_document(conditions: &[Condition]) -> Result<Document> {
    if conditions.is_empty() {
        return Ok(doc! {});
    }
    let clauses = conditions
        .iter()
        .map(condition_to_document)
        .collect::<Result<Vec<_>>>()?;
    Ok(doc! { "$and": clauses })
}

impl<T: Entity> MongoStore<T> {
    pub fn new(database: &Database) -> Self {
        MongoStore {
            collection: database.collection::<Document>(T::COLLECTION),
            _kind: PhantomData,
        }
    }

    /// Create the declared indexes. Id and uniqueness tuples are unique.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let mut id_key = Document::new();
        id_key.insert(T::ID_FIELD, 1);
        let mut models = vec![IndexModel::builder()
            .keys(id_key)
            .options(IndexOptions::builder().unique(true).build())
            .build()];
        for field in T::INDEX_FIELDS {
            if *field == T::ID_FIELD {
                continue;
            }
            let mut keys = Document::new();
            keys.insert(*field, 1);
            models.push(IndexModel::builder().keys(keys).build());
        }
        for tuple in T::UNIQUE_FIELDS {
            let mut keys = Document::new();
            for field in *tuple {
                keys.insert(*field, 1);
            }
            models.push(
                IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            );
        }
        self.collection
            .create_indexes(models)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    fn decode(document: Document) -> Result<T> {
        mongodb::bson::from_document(document).map_err(|e| Error::internal(e.to_string()))
    }

    fn keyword_clause(keyword: &str) -> Document {
        let fields: Vec<Document> = T::SEARCH_FIELDS
            .iter()
            .map(|field| {
                let mut clause = Document::new();
                clause.insert(
                    *field,
                    doc! { "$regex": escape_regex(keyword), "$options": "i" },
                );
                clause
            })
            .collect();
        doc! { "$or": fields }
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for MongoStore<T> {
    async fn insert(&self, record: &T) -> Result<()> {
        let document = to_document(record).map_err(|e| Error::internal(e.to_string()))?;
        match self.collection.insert_one(document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                let name = serde_json::to_value(record)
                    .ok()
                    .and_then(|v| v.get("name").and_then(Value::as_str).map(String::from))
                    .unwrap_or_default();
                Err(Error::NameConflict { name })
            }
            Err(err) => Err(db_err(err)),
        }
    }

    async fn find_one(&self, conditions: &[Condition]) -> Result<Option<T>> {
        let filter = filter_document(conditions)?;
        match self.collection.find_one(filter).await.map_err(db_err)? {
            Some(document) => Ok(Some(Self::decode(document)?)),
            None => Ok(None),
        }
    }

    async fn replace(&self, record: &T) -> Result<bool> {
        let document = to_document(record).map_err(|e| Error::internal(e.to_string()))?;
        let result = self
            .collection
            .replace_one(doc! { T::ID_FIELD: record.id() }, document)
            .await
            .map_err(db_err)?;
        Ok(result.matched_count > 0)
    }

    async fn remove(&self, conditions: &[Condition]) -> Result<bool> {
        let filter = filter_document(conditions)?;
        let result = self.collection.delete_many(filter).await.map_err(db_err)?;
        Ok(result.deleted_count > 0)
    }

    async fn query(&self, query: &Query) -> Result<(Vec<T>, u64)> {
        let mut filter = filter_document(&query.filter)?;
        if let Some(keyword) = &query.keyword {
            let keyword_clause = Self::keyword_clause(keyword);
            filter = doc! { "$and": [filter, keyword_clause] };
        }

        let total = self
            .collection
            .count_documents(filter.clone())
            .await
            .map_err(db_err)?;

        let mut find = self.collection.find(filter);
        if let Some(sort) = &query.sort {
            let mut order = Document::new();
            order.insert(sort.key.clone(), if sort.desc { -1 } else { 1 });
            find = find.sort(order);
        }
        if let Some(page) = &query.page {
            find = find.skip(page.start).limit(page.limit as i64);
        }

        let mut cursor = find.await.map_err(db_err)?;
        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(db_err)? {
            records.push(Self::decode(document)?);
        }
        Ok((records, total))
    }

    async fn filter(&self, conditions: &[Condition]) -> Result<Vec<T>> {
        let filter = filter_document(conditions)?;
        let mut cursor = self.collection.find(filter).await.map_err(db_err)?;
        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(db_err)? {
            records.push(Self::decode(document)?);
        }
        Ok(records)
    }

    async fn stat(&self, query: &StatQuery) -> Result<Vec<Value>> {
        let mut pipeline = vec![doc! { "$match": filter_document(&query.filter)? }];
        match &query.aggregate {
            Aggregate::Count { name } => {
                pipeline.push(doc! { "$count": name });
            }
            Aggregate::Group { keys, count_name } => {
                let mut group_id = Document::new();
                for key in keys {
                    group_id.insert(key.name.clone(), format!("${}", key.key));
                }
                let mut group = Document::new();
                group.insert("_id", group_id);
                group.insert(count_name.clone(), doc! { "$sum": 1 });
                pipeline.push(doc! { "$group": group });

                let mut projection = Document::new();
                projection.insert("_id", 0);
                projection.insert(count_name.clone(), 1);
                for key in keys {
                    projection.insert(key.name.clone(), format!("$_id.{}", key.name));
                }
                pipeline.push(doc! { "$project": projection });
            }
        }

        let mut cursor = self.collection.aggregate(pipeline).await.map_err(db_err)?;
        let mut rows = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(db_err)? {
            rows.push(Bson::Document(document).into_relaxed_extjson());
        }
        Ok(rows)
    }
}
