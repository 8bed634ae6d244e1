//! Progress transports.
//!
//! [`ProgressSource`] is the seam between the client's state machine and
//! the network: one method opens the push stream, the other performs a
//! single poll. [`HttpProgressSource`] implements both over HTTP using
//! [`reqwest`].

use async_trait::async_trait;
use coldreach_core::endpoints::{progress_poll_url, progress_stream_url};
use coldreach_core::types::OperationId;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;

use crate::error::ProgressError;
use crate::sse::SseDecoder;

/// Raw progress payloads in arrival order.
pub type ProgressStream = BoxStream<'static, Result<String, ProgressError>>;

#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Open the push stream for one operation.
    async fn stream(
        &self,
        operation_id: &OperationId,
        credential: &str,
    ) -> Result<ProgressStream, ProgressError>;

    /// Fetch the operation's current progress payload once.
    async fn poll(&self, operation_id: &OperationId, credential: &str)
        -> Result<String, ProgressError>;
}

/// HTTP implementation of [`ProgressSource`].
pub struct HttpProgressSource {
    client: reqwest::Client,
    api_url: String,
}

impl HttpProgressSource {
    /// * `api_url` - base HTTP API URL, e.g. `https://app.example.com/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] and its connection pool.
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProgressError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProgressError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ProgressSource for HttpProgressSource {
    async fn stream(
        &self,
        operation_id: &OperationId,
        credential: &str,
    ) -> Result<ProgressStream, ProgressError> {
        // The credential rides in the URI: EventSource-style transports
        // cannot set headers.
        let url = progress_stream_url(&self.api_url, operation_id, credential)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        Ok(decode_sse(response.bytes_stream()))
    }

    async fn poll(
        &self,
        operation_id: &OperationId,
        credential: &str,
    ) -> Result<String, ProgressError> {
        let url = progress_poll_url(&self.api_url, operation_id)?;
        let response = self.client.get(url).bearer_auth(credential).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }
}

/// Turn a body byte stream into SSE `data` payloads.
///
/// An event left unterminated when the body ends is still delivered.
fn decode_sse<S, B, E>(body: S) -> ProgressStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut decoder = SseDecoder::new();
    body.map(Some)
        .chain(futures::stream::once(futures::future::ready(None)))
        .map(move |chunk| match chunk {
            Some(Ok(bytes)) => decoder
                .feed(bytes.as_ref())
                .into_iter()
                .map(Ok)
                .collect::<Vec<_>>(),
            Some(Err(e)) => vec![Err(ProgressError::Transport(e.to_string()))],
            None => decoder.finish().into_iter().map(Ok).collect(),
        })
        .flat_map(futures::stream::iter)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trailing_event_is_flushed_when_body_ends() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(&b"data: {\"progress\":40}\n\n"[..]),
            Ok(&b"data: {\"progress\":100}"[..]),
        ];
        let events: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;
        let events: Vec<String> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events, vec![r#"{"progress":40}"#, r#"{"progress":100}"#]);
    }

    #[tokio::test]
    async fn body_error_becomes_transport_error() {
        let chunks: Vec<Result<&'static [u8], String>> =
            vec![Ok(&b"data: a\n\n"[..]), Err("reset".to_string())];
        let events: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_deref().ok(), Some("a"));
        assert!(matches!(&events[1], Err(ProgressError::Transport(m)) if m == "reset"));
    }
}
