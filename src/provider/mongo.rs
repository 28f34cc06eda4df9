//! # In-Database Backend
//!
//! Payload collection in the same database as the metadata records. `put`
//! is an insert against a unique index on the id, `update` replaces the
//! whole document.

use async_trait::async_trait;
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::config::MongoPayloadSettings;
use crate::error::{Error, Result};
use crate::provider::SecretStoreBackend;

const STORE: &str = "mongodb";

pub struct MongoPayloadStore {
    collection: Collection<Document>,
}

impl std::fmt::Debug for MongoPayloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoPayloadStore")
            .field("collection", &self.collection.name())
            .finish_non_exhaustive()
    }
}

fn mongo_err(err: mongodb::error::Error) -> Error {
    Error::StoreUnavailable {
        store: STORE,
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

impl MongoPayloadStore {
    pub async fn new(database: &Database, config: &MongoPayloadSettings) -> Result<Self> {
        let collection = database.collection::<Document>(&config.collection);
        collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "secret_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(mongo_err)?;
        Ok(MongoPayloadStore { collection })
    }

    fn document(id: &str, payload: &[u8]) -> Result<Document> {
        let data: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|_| Error::internal("backend payload is not valid JSON"))?;
        let data = to_bson(&data).map_err(|e| Error::internal(e.to_string()))?;
        Ok(doc! { "secret_id": id, "data": data })
    }
}

#[async_trait]
impl SecretStoreBackend for MongoPayloadStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        let document = Self::document(id, payload)?;
        match self.collection.insert_one(document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(Error::AlreadyExists { id: id.to_string() })
            }
            Err(err) => Err(mongo_err(err)),
        }
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let document = self
            .collection
            .find_one(doc! { "secret_id": id })
            .await
            .map_err(mongo_err)?
            .ok_or_else(|| Error::not_found("secret payload", id))?;
        let data = document
            .get("data")
            .cloned()
            .unwrap_or(Bson::Null)
            .into_relaxed_extjson();
        serde_json::to_vec(&data).map_err(|e| Error::internal(e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.collection
            .delete_one(doc! { "secret_id": id })
            .await
            .map_err(mongo_err)?;
        Ok(())
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        let document = Self::document(id, payload)?;
        let result = self
            .collection
            .replace_one(doc! { "secret_id": id }, document)
            .await
            .map_err(mongo_err)?;
        if result.matched_count == 0 {
            return Err(Error::not_found("secret payload", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_embeds_parsed_payload() {
        let document =
            MongoPayloadStore::document("secret-abc", br#"{"k":"v"}"#).unwrap();
        assert_eq!(document.get_str("secret_id").unwrap(), "secret-abc");
        assert_eq!(
            document.get_document("data").unwrap().get_str("k").unwrap(),
            "v"
        );
    }

    #[test]
    fn test_document_rejects_non_json_payload() {
        let err = MongoPayloadStore::document("secret-abc", b"\xff\xfe").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
    }
}
