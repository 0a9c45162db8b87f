use crate::error::StoreError;
use crate::models::{VectorEntry, VectorFilter, VectorHit};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use uuid::Uuid;

const BACKEND: &str = "chroma";

/// Vector store over the ChromaDB REST API.
///
/// The collection is created on first use (`get_or_create`) with cosine
/// distance, and its id is cached for the lifetime of the store.
pub struct ChromaStore {
    endpoint: String,
    collection: String,
    dimensions: usize,
    client: Client,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            dimensions,
            client: Client::new(),
            collection_id: OnceCell::new(),
        }
    }

    async fn collection_id(&self) -> Result<&str, StoreError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(format!("{}/api/v1/collections", self.endpoint))
                    .json(&json!({
                        "name": self.collection,
                        "get_or_create": true,
                        "metadata": {"hnsw:space": "cosine"}
                    }))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(StoreError::BackendResponse {
                        backend: BACKEND.to_string(),
                        details: response.status().to_string(),
                    });
                }

                let body: Value = response.json().await?;
                body.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::NotReady(format!("collection {}", self.collection)))
            })
            .await?;
        Ok(id.as_str())
    }

    async fn post(&self, action: &str, body: Value) -> Result<Value, StoreError> {
        let collection_id = self.collection_id().await?;
        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/{}",
                self.endpoint, collection_id, action
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{action} returned {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), StoreError> {
        if embedding.len() != self.dimensions {
            return Err(StoreError::Request(format!(
                "embedding dimension {} != {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        self.collection_id().await.map(|_| ())
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            self.check_dimension(&entry.embedding)?;
        }

        self.post("add", build_add(entries)).await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, StoreError> {
        self.check_dimension(embedding)?;

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["distances"]
        });
        if let Some(clause) = build_where(filter) {
            body["where"] = clause;
        }

        let response = self.post("query", body).await?;
        parse_query(&response)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.iter().map(Uuid::to_string).collect::<Vec<_>>();
        self.post("delete", json!({ "ids": ids })).await?;
        Ok(())
    }
}

fn build_add(entries: &[VectorEntry]) -> Value {
    let ids = entries.iter().map(|entry| entry.id.to_string()).collect::<Vec<_>>();
    let embeddings = entries.iter().map(|entry| &entry.embedding).collect::<Vec<_>>();
    let documents = entries.iter().map(|entry| &entry.document).collect::<Vec<_>>();
    let metadatas = entries
        .iter()
        .map(|entry| {
            json!({
                "content_id": entry.metadata.content_id.to_string(),
                "manufacturer": entry.metadata.manufacturer,
                "model_series": entry.metadata.model_series,
                "content_type": entry.metadata.content_type.as_str(),
                "source_manual": entry.metadata.source_manual,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "ids": ids,
        "embeddings": embeddings,
        "documents": documents,
        "metadatas": metadatas,
    })
}

fn build_where(filter: &VectorFilter) -> Option<Value> {
    filter
        .content_type
        .map(|content_type| json!({"content_type": content_type.as_str()}))
}

fn parse_query(body: &Value) -> Result<Vec<VectorHit>, StoreError> {
    let malformed = |details: &str| StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: details.to_string(),
    };

    let ids = body
        .pointer("/ids/0")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("query response has no ids"))?;
    let distances = body
        .pointer("/distances/0")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("query response has no distances"))?;

    ids.iter()
        .zip(distances)
        .map(|(id, distance)| {
            let id = id
                .as_str()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or_else(|| malformed("query response has a non-uuid id"))?;
            let distance = distance
                .as_f64()
                .ok_or_else(|| malformed("query response has a non-numeric distance"))?;
            Ok(VectorHit { id, distance })
        })
        .collect()
}
