//! Job submission for lead imports.
//!
//! [`HttpImportApi`] posts the file and its column mapping to
//! `POST {api}/leads/import` as multipart form data using [`reqwest`].
//! The server answers either with an operation id to follow or, for
//! small files, with the finished import counters.

use std::collections::BTreeMap;

use async_trait::async_trait;
use coldreach_core::endpoints::import_url;
use coldreach_core::progress::ImportSummary;
use coldreach_core::types::OperationId;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::ImportError;
use crate::file::LeadFile;

/// CSV column name -> lead field name.
pub type FieldMapping = BTreeMap<String, String>;

/// What the server did with a submitted import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Import runs in the background; follow it by id.
    Operation(OperationId),
    /// Import already finished.
    Completed(ImportSummary),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubmitBody {
    #[serde(rename_all = "camelCase")]
    Operation { operation_id: OperationId },
    Completed(ImportSummary),
}

impl From<SubmitBody> for SubmitResponse {
    fn from(body: SubmitBody) -> Self {
        match body {
            SubmitBody::Operation { operation_id } => SubmitResponse::Operation(operation_id),
            SubmitBody::Completed(summary) => SubmitResponse::Completed(summary),
        }
    }
}

/// Parse the body of a successful submission.
pub fn parse_submit_response(body: &str) -> Result<SubmitResponse, ImportError> {
    serde_json::from_str::<SubmitBody>(body)
        .map(SubmitResponse::from)
        .map_err(|e| ImportError::UnexpectedResponse(format!("{e}: {body}")))
}

#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(
        &self,
        file: &LeadFile,
        mapping: &FieldMapping,
        credential: &str,
    ) -> Result<SubmitResponse, ImportError>;
}

/// HTTP client for the import endpoint.
pub struct HttpImportApi {
    client: reqwest::Client,
    api_url: String,
}

impl HttpImportApi {
    /// * `api_url` - base HTTP API URL, e.g. `https://app.example.com/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ImportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ImportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl JobSubmitter for HttpImportApi {
    async fn submit(
        &self,
        file: &LeadFile,
        mapping: &FieldMapping,
        credential: &str,
    ) -> Result<SubmitResponse, ImportError> {
        let url = import_url(&self.api_url)?;

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str("text/csv")?;
        let mut form = Form::new().part("file", part);
        if !mapping.is_empty() {
            let mapping = serde_json::to_string(mapping)
                .map_err(|e| ImportError::UnexpectedResponse(e.to_string()))?;
            form = form.text("mapping", mapping);
        }

        tracing::debug!(file = %file.name, size = file.size(), "Submitting lead import");

        let response = self
            .client
            .post(url)
            .bearer_auth(credential)
            .multipart(form)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        parse_submit_response(&response.text().await?)
    }
}
