//! `mongodb`-backed [`DocumentConnection`] (SPEC_FULL.md C7).

use async_trait::async_trait;
use bson::{Bson, Document};
use futures_util::TryStreamExt;
use mongodb::options::{FindOptions, UpdateModifications};
use mongodb::Database;

use crate::errors::StoreResult;

use super::DocumentConnection;
use crate::store::{SortDirection, StoreOptions};

pub struct MongoDocumentConnection {
    database: Database,
}

impl MongoDocumentConnection {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn find_options(opts: &StoreOptions) -> FindOptions {
        let mut builder = FindOptions::default();
        builder.skip = opts.skip;
        builder.limit = opts.limit.map(|n| n as i64);
        if !opts.sort.is_empty() {
            let mut sort = Document::new();
            for spec in &opts.sort {
                let direction = match spec.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                sort.insert(spec.field.clone(), direction);
            }
            builder.sort = Some(sort);
        }
        builder
    }
}

#[async_trait]
impl DocumentConnection for MongoDocumentConnection {
    async fn ensure_collection(&self, name: &str) -> StoreResult<()> {
        let names = self.database.list_collection_names().await?;
        if !names.iter().any(|n| n == name) {
            self.database.create_collection(name).await?;
        }
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }
        let collection = self.database.collection::<Document>(collection);
        let result = collection.insert_many(documents).await?;
        Ok(result.inserted_ids.into_values().collect())
    }

    async fn find(&self, collection: &str, filter: &Document, opts: &StoreOptions) -> StoreResult<Vec<Document>> {
        let collection = self.database.collection::<Document>(collection);
        let cursor = collection.find(filter.clone()).with_options(Self::find_options(opts)).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_many(&self, collection: &str, filter: &Document, update: &Document) -> StoreResult<u64> {
        let collection = self.database.collection::<Document>(collection);
        let result = collection
            .update_many(filter.clone(), UpdateModifications::Document(update.clone()))
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let collection = self.database.collection::<Document>(collection);
        let result = collection.delete_many(filter.clone()).await?;
        Ok(result.deleted_count)
    }
}
