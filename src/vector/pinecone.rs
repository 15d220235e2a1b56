use crate::error::{Error, Result};
use crate::vector::{Metadata, VectorMatch, VectorRecord, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION: &str = "2024-07";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Pinecone index accessed over its data-plane REST API
pub struct PineconeStore {
    client: Client,
    host: String,
    api_key: String,
}

impl PineconeStore {
    /// `host` is the index host; `https://` is assumed when no scheme is given
    pub fn new(api_key: impl Into<String>, host: &str) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::Config("Pinecone host cannot be empty".to_string()));
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            host,
            api_key: api_key.into(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn check(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Vector(format!(
            "Pinecone {operation} failed with HTTP {status}: {body}"
        )))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize> {
        if records.is_empty() {
            debug!("No vectors to upsert");
            return Ok(0);
        }

        info!(
            "Upserting {} vectors to namespace '{}'",
            records.len(),
            namespace
        );

        let request = self
            .client
            .post(format!("{}/vectors/upsert", self.host))
            .json(&json!({ "vectors": records, "namespace": namespace }));
        let response = Self::check("upsert", self.authed(request).send().await?).await?;

        let parsed: UpsertResponse = response
            .json()
            .await
            .map_err(|e| Error::Vector(format!("Malformed upsert response: {e}")))?;
        Ok(parsed.upserted_count)
    }

    async fn query(&self, vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        let request = self.client.post(format!("{}/query", self.host)).json(&json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": namespace,
        }));
        let response = Self::check("query", self.authed(request).send().await?).await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Vector(format!("Malformed query response: {e}")))?;

        debug!("Pinecone query returned {} matches", parsed.matches.len());

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch(&self, id: &str, namespace: &str) -> Result<Option<VectorRecord>> {
        let request = self
            .client
            .get(format!("{}/vectors/fetch", self.host))
            .query(&[("ids", id), ("namespace", namespace)]);
        let response = Self::check("fetch", self.authed(request).send().await?).await?;

        let mut parsed: FetchResponse = response
            .json()
            .await
            .map_err(|e| Error::Vector(format!("Malformed fetch response: {e}")))?;

        Ok(parsed.vectors.remove(id).map(|v| VectorRecord {
            id: v.id,
            values: v.values,
            metadata: v.metadata.unwrap_or_default(),
        }))
    }

    async fn delete_all(&self, namespace: &str) -> Result<()> {
        info!("Deleting all vectors in namespace '{}'", namespace);

        let request = self
            .client
            .post(format!("{}/vectors/delete", self.host))
            .json(&json!({ "deleteAll": true, "namespace": namespace }));
        Self::check("delete", self.authed(request).send().await?).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
