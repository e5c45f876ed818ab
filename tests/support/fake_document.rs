//! In-memory stand-in for [`DocumentConnection`], matching documents
//! against the near-Mongo-shaped filters the document translator emits
//! (`$and`/`$or`/`$nor`, `$eq`/`$ne`/ordering/`$in`/`$nin`/`$exists`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use storecraft::errors::StoreResult;
use storecraft::store::document::DocumentConnection;
use storecraft::store::{SortDirection, StoreOptions};

#[derive(Default)]
pub struct FakeDocumentConnection {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl FakeDocumentConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentConnection for FakeDocumentConnection {
    async fn ensure_collection(&self, name: &str) -> StoreResult<()> {
        self.collections.lock().unwrap().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn insert_many(&self, collection: &str, mut documents: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let mut ids = Vec::with_capacity(documents.len());
        let mut guard = self.collections.lock().unwrap();
        let store = guard.entry(collection.to_string()).or_default();
        for doc in &mut documents {
            if !doc.contains_key("_id") {
                doc.insert("_id", Bson::ObjectId(ObjectId::new()));
            }
            ids.push(doc.get("_id").cloned().unwrap());
        }
        store.extend(documents);
        Ok(ids)
    }

    async fn find(&self, collection: &str, filter: &Document, opts: &StoreOptions) -> StoreResult<Vec<Document>> {
        let guard = self.collections.lock().unwrap();
        let mut matched: Vec<Document> = guard
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| matches(doc, filter))
            .cloned()
            .collect();

        for sort in opts.sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = a.get(&sort.field).map(bson_sort_key).cmp(&b.get(&sort.field).map(bson_sort_key));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(skip) = opts.skip {
            matched = matched.into_iter().skip(skip as usize).collect();
        }
        if let Some(limit) = opts.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn update_many(&self, collection: &str, filter: &Document, update: &Document) -> StoreResult<u64> {
        let mut guard = self.collections.lock().unwrap();
        let mut count = 0u64;
        if let Some(docs) = guard.get_mut(collection) {
            for doc in docs.iter_mut().filter(|doc| matches(doc, filter)) {
                if let Some(Bson::Document(set)) = update.get("$set") {
                    for (key, value) in set {
                        doc.insert(key.clone(), value.clone());
                    }
                } else {
                    for (key, value) in update {
                        doc.insert(key.clone(), value.clone());
                    }
                }
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let mut guard = self.collections.lock().unwrap();
        if let Some(docs) = guard.get_mut(collection) {
            let before = docs.len();
            docs.retain(|doc| !matches(doc, filter));
            return Ok((before - docs.len()) as u64);
        }
        Ok(0)
    }
}

fn bson_sort_key(value: &Bson) -> String {
    value.to_string()
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match key.as_str() {
        "$and" => as_array(expected).iter().all(|f| matches(doc, as_doc(f))),
        "$or" => as_array(expected).iter().any(|f| matches(doc, as_doc(f))),
        "$nor" => !as_array(expected).iter().any(|f| matches(doc, as_doc(f))),
        field => matches_field(doc.get(field), expected),
    })
}

fn as_array(value: &Bson) -> Vec<Bson> {
    value.as_array().cloned().unwrap_or_default()
}

fn as_doc(value: &Bson) -> &Document {
    value.as_document().expect("logical operand must be a document")
}

fn matches_field(actual: Option<&Bson>, expected: &Bson) -> bool {
    match expected {
        Bson::Document(ops) if ops.keys().all(|k| k.starts_with('$')) => ops.iter().all(|(op, value)| match op.as_str() {
            "$eq" => actual == Some(value),
            "$ne" => actual != Some(value),
            "$gt" => compare(actual, value).is_some_and(|o| o == std::cmp::Ordering::Greater),
            "$gte" => compare(actual, value).is_some_and(|o| o != std::cmp::Ordering::Less),
            "$lt" => compare(actual, value).is_some_and(|o| o == std::cmp::Ordering::Less),
            "$lte" => compare(actual, value).is_some_and(|o| o != std::cmp::Ordering::Greater),
            "$in" => as_array(value).iter().any(|v| actual == Some(v)),
            "$nin" => !as_array(value).iter().any(|v| actual == Some(v)),
            "$exists" => actual.is_some() == value.as_bool().unwrap_or(true),
            _ => true,
        }),
        other => actual == Some(other),
    }
}

fn compare(actual: Option<&Bson>, expected: &Bson) -> Option<std::cmp::Ordering> {
    match (actual?, expected) {
        (Bson::Int32(a), Bson::Int32(b)) => a.partial_cmp(b),
        (Bson::Int64(a), Bson::Int64(b)) => a.partial_cmp(b),
        (Bson::Double(a), Bson::Double(b)) => a.partial_cmp(b),
        (Bson::String(a), Bson::String(b)) => a.partial_cmp(b),
        _ => None,
    }
}
