//! Client side of Jellyfin Export.
//!
//! [`ExportClient`] speaks the server's v1 API and doubles as the
//! [`RemoteCaller`] behind the settings form buttons, so a CLI click goes
//! through exactly the same remote methods as the settings screen.

use async_trait::async_trait;
use jellyfin_export_core::{
    actions::{RemoteCall, RemoteCallError, RemoteCaller},
    api::{
        routes::{utils::replace_param, v1},
        types::{ApiResponse, ExportsQuery, JobsOverview, JobsQuery},
    },
    export_map::ExportRecord,
    jobs::JobRecord,
    settings::ExportSettings,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug)]
pub struct ExportClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExportClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Raw form description as the settings screen receives it.
    pub async fn form(&self) -> Result<Value, ClientError> {
        self.get(v1::settings::FORM).await
    }

    pub async fn settings(&self) -> Result<ExportSettings, ClientError> {
        self.get(v1::settings::DOCUMENT).await
    }

    pub async fn put_settings(
        &self,
        settings: &ExportSettings,
    ) -> Result<ExportSettings, ClientError> {
        let response = self
            .http
            .put(self.url(v1::settings::DOCUMENT))
            .json(settings)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    pub async fn jobs(&self, limit: Option<usize>) -> Result<JobsOverview, ClientError> {
        self.get_with_query(v1::jobs::OVERVIEW, &JobsQuery { limit })
            .await
    }

    pub async fn job(&self, id: Uuid) -> Result<JobRecord, ClientError> {
        self.get(&replace_param(v1::jobs::ITEM, "{id}", id.to_string()))
            .await
    }

    pub async fn exports(
        &self,
        query: &ExportsQuery,
    ) -> Result<Vec<ExportRecord>, ClientError> {
        self.get_with_query(v1::exports::LIST, query).await
    }

    /// Invoke a whitelisted remote method; returns the response `data`.
    pub async fn call_method(&self, call: &RemoteCall) -> Result<Value, ClientError> {
        let path = replace_param(v1::method::CALL, "{method}", call.method.name());
        debug!(method = %call.method, "calling remote method");
        let response = self
            .http
            .post(self.url(&path))
            .json(&call.args)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        unwrap_envelope(response).await
    }

    async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        unwrap_envelope(response).await
    }
}

#[async_trait]
impl RemoteCaller for ExportClient {
    async fn call(&self, call: &RemoteCall) -> Result<Value, RemoteCallError> {
        self.call_method(call).await.map_err(|err| match err {
            ClientError::Server { message, .. } => RemoteCallError::Rejected(message),
            other => RemoteCallError::Transport(other.to_string()),
        })
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body.trim().to_string()
                }
            }),
        });
    }

    let envelope: ApiResponse<T> = serde_json::from_str(&body)
        .map_err(|err| ClientError::Malformed(err.to_string()))?;
    match envelope.data {
        Some(data) if envelope.is_success() => Ok(data),
        _ => Err(ClientError::Malformed(
            envelope
                .error
                .unwrap_or_else(|| "response carried no data".to_string()),
        )),
    }
}

/// Message of an `{"error": {"message": ..}}` body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match &value["error"] {
        Value::String(message) => Some(message.clone()),
        error => error["message"].as_str().map(str::to_string),
    }
}

/// Settings document from a TOML or JSON file.
pub fn read_settings_file(path: &Path) -> anyhow::Result<ExportSettings> {
    use anyhow::Context;

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("invalid settings JSON {}", path.display())),
        _ => toml::from_str(&contents)
            .with_context(|| format!("invalid settings TOML {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_reads_both_shapes() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Jellyfin Export is disabled.","status":409}}"#),
            Some("Jellyfin Export is disabled.".to_string())
        );
        assert_eq!(
            error_message(r#"{"status":"error","error":"boom"}"#),
            Some("boom".to_string())
        );
        assert_eq!(error_message("Failed to parse the request body"), None);
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = ExportClient::new("http://media.local:3000/").unwrap();
        assert_eq!(client.base_url(), "http://media.local:3000");
        assert_eq!(
            client.url(v1::settings::FORM),
            "http://media.local:3000/api/v1/settings/form"
        );
    }
}
