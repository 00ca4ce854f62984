use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use concierge_core::config::SearchConfig;
use concierge_core::domain::restaurant::SearchHit;
use concierge_core::ports::{Collaborator, CollaboratorError, SearchIndex, SearchQuery};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SearchHit,
}

/// Search index backed by an OpenSearch `match` query.
pub struct OpenSearchIndex {
    client: Client,
    search_url: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl OpenSearchIndex {
    pub fn new(
        base_url: &str,
        index: &str,
        timeout: Duration,
        username: Option<String>,
        password: Option<SecretString>,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CollaboratorError::request(Collaborator::Search, error))?;
        let search_url = format!("{}/{}/_search", base_url.trim_end_matches('/'), index.trim());
        Ok(Self { client, search_url, username, password })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, CollaboratorError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            CollaboratorError::request(Collaborator::Search, "search.base_url is not configured")
        })?;
        Self::new(
            base_url,
            &config.index,
            Duration::from_secs(config.timeout_secs),
            config.username.clone(),
            config.password.clone(),
        )
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CollaboratorError> {
        let mut field = Map::new();
        field.insert(query.match_field.clone(), Value::String(query.value.clone()));
        let body = json!({ "size": query.size, "query": { "match": field } });

        let mut request = self.client.post(&self.search_url).json(&body);
        if let Some(username) = &self.username {
            request = request
                .basic_auth(username, self.password.as_ref().map(|password| password.expose_secret()));
        }

        let response = request
            .send()
            .await
            .map_err(|error| CollaboratorError::request(Collaborator::Search, error))?;
        if !response.status().is_success() {
            return Err(CollaboratorError::status(Collaborator::Search, response.status().as_u16()));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|error| CollaboratorError::decode(Collaborator::Search, error))?;
        let hits = payload.hits.hits.into_iter().map(|hit| hit.source).collect::<Vec<_>>();

        debug!(
            event_name = "worker.search_completed",
            match_field = %query.match_field,
            value = %query.value,
            hits = hits.len(),
            "search index query completed"
        );
        Ok(hits)
    }
}
