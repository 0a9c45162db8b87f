use crate::error::StoreError;
use crate::models::{ContentRecord, RecordFilter};
use crate::traits::RecordStore;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const BACKEND: &str = "opensearch";

/// Structured record store backed by one OpenSearch index.
pub struct OpenSearchStore {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
}

impl OpenSearchStore {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            index_name: index_name.into(),
        }
    }

    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .head(format!("{}/{}", self.endpoint, self.index_name))
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, self.index_name))
            .json(&json!({
                "settings": {
                    "number_of_shards": 1,
                    "number_of_replicas": 0
                },
                "mappings": {
                    "properties": {
                        "id": {"type": "keyword"},
                        "manufacturer": {"type": "keyword"},
                        "model_series": {"type": "keyword"},
                        "section_title": {"type": "text"},
                        "content": {"type": "text", "analyzer": "standard"},
                        "content_type": {"type": "keyword"},
                        "confidence_score": {"type": "double"},
                        "source_manual": {"type": "keyword"},
                        "page_reference": {"type": "keyword"},
                        "created_at": {"type": "date"}
                    }
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "open-search index setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn document_url(&self, id: Uuid) -> String {
        format!("{}/{}/_doc/{}", self.endpoint, self.index_name, id)
    }
}

#[async_trait]
impl RecordStore for OpenSearchStore {
    async fn insert(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let response = self
            .client
            .put(format!("{}?refresh=true", self.document_url(record.id)))
            .json(&serde_json::to_value(record)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, StoreError> {
        let response = self.client.get(self.document_url(id)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let body: Value = response.json().await?;
        match body.get("_source") {
            Some(source) => Ok(Some(serde_json::from_value(source.clone())?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let response = self
            .client
            .post(format!("{}/{}/_search", self.endpoint, self.index_name))
            .json(&build_search(filter, limit, offset))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let body: Value = response.json().await?;
        parse_hits(&body)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let response = self
            .client
            .delete(format!("{}?refresh=true", self.document_url(id)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(backend_error(status)),
        }
    }
}

fn backend_error(status: StatusCode) -> StoreError {
    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: status.to_string(),
    }
}

/// Newest-first search body for a record filter.
///
/// Manufacturer and every query term are case-insensitive substring matches,
/// the same rule the in-memory store applies. A single-token term is a
/// wildcard over the analyzed content, so `drain` finds `drainage`; a term
/// with spaces is matched as a phrase.
fn build_search(filter: &RecordFilter, limit: usize, offset: usize) -> Value {
    let mut predicates = Vec::new();

    if let Some(manufacturer) = &filter.manufacturer {
        predicates.push(json!({
            "wildcard": {
                "manufacturer": {
                    "value": format!("*{}*", escape_wildcard(manufacturer)),
                    "case_insensitive": true
                }
            }
        }));
    }
    if let Some(content_type) = filter.content_type {
        predicates.push(json!({"term": {"content_type": content_type.as_str()}}));
    }
    if filter.min_confidence > 0.0 {
        predicates.push(json!({"range": {"confidence_score": {"gte": filter.min_confidence}}}));
    }

    let must = if filter.terms.is_empty() {
        vec![json!({"match_all": {}})]
    } else {
        filter
            .terms
            .iter()
            .map(|term| {
                if term.contains(char::is_whitespace) {
                    json!({"match_phrase": {"content": term}})
                } else {
                    json!({
                        "wildcard": {
                            "content": {
                                "value": format!("*{}*", escape_wildcard(term)),
                                "case_insensitive": true
                            }
                        }
                    })
                }
            })
            .collect()
    };

    json!({
        "from": offset,
        "size": limit,
        "query": {
            "bool": {
                "must": must,
                "filter": predicates
            }
        },
        "sort": [{"created_at": {"order": "desc"}}]
    })
}

fn escape_wildcard(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| match c {
            '*' | '?' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}

fn parse_hits(body: &Value) -> Result<Vec<ContentRecord>, StoreError> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no hits array".to_string(),
        })?;

    hits.iter()
        .filter_map(|hit| hit.get("_source"))
        .map(|source| serde_json::from_value(source.clone()).map_err(StoreError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, ContentType};

    #[test]
    fn search_body_carries_every_filter() {
        let filter = RecordFilter {
            manufacturer: Some("whirl*".to_string()),
            content_type: Some(ContentType::Safety),
            min_confidence: 0.4,
            terms: vec!["drain".to_string(), "pump".to_string()],
        };

        let body = build_search(&filter, 20, 40);

        assert_eq!(body["from"], 40);
        assert_eq!(body["size"], 20);
        assert_eq!(
            body.pointer("/query/bool/filter/0/wildcard/manufacturer/value"),
            Some(&json!("*whirl\\**"))
        );
        assert_eq!(
            body.pointer("/query/bool/filter/1/term/content_type"),
            Some(&json!("safety"))
        );
        assert_eq!(
            body.pointer("/query/bool/filter/2/range/confidence_score/gte"),
            Some(&json!(0.4))
        );
        assert_eq!(
            body.pointer("/query/bool/must/0/wildcard/content/value"),
            Some(&json!("*drain*"))
        );
        assert_eq!(
            body.pointer("/query/bool/must/1/wildcard/content/value"),
            Some(&json!("*pump*"))
        );
        assert_eq!(
            body.pointer("/query/bool/must/1/wildcard/content/case_insensitive"),
            Some(&json!(true))
        );
        assert_eq!(body.pointer("/sort/0/created_at/order"), Some(&json!("desc")));
    }

    #[test]
    fn multi_word_term_is_a_phrase() {
        let filter = RecordFilter {
            terms: vec!["e1 f2".to_string()],
            ..RecordFilter::default()
        };
        let body = build_search(&filter, 10, 0);
        assert_eq!(
            body.pointer("/query/bool/must/0/match_phrase/content"),
            Some(&json!("e1 f2"))
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let body = build_search(&RecordFilter::default(), 10, 0);
        assert!(body.pointer("/query/bool/must/0/match_all").is_some());
        assert_eq!(body.pointer("/query/bool/filter"), Some(&json!([])));
    }

    #[test]
    fn hits_parse_back_into_records() {
        let record = ContentRecord::new(
            "Check the door seal".to_string(),
            "Door".to_string(),
            ContentMetadata {
                manufacturer: "Bosch".to_string(),
                model_series: "WAT28400".to_string(),
                content_type: ContentType::Maintenance,
                source_manual: "bosch.pdf".to_string(),
            },
            0.7,
            2,
        );
        let body = json!({
            "hits": {"hits": [{"_id": record.id.to_string(), "_source": record}]}
        });

        let parsed = parse_hits(&body).expect("parse");
        assert_eq!(parsed, vec![record]);
        assert!(parse_hits(&json!({"error": "boom"})).is_err());
    }
}
