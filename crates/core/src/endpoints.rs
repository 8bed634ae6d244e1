//! URL construction for every server endpoint the client talks to.
//!
//! Push transports (Server-Sent Events, WebSocket) cannot carry custom
//! headers from every runtime, so their credential travels as a `token`
//! query parameter. Plain HTTP requests send it as a bearer header
//! instead and use the credential-free URLs built here.

use url::Url;

use crate::error::CoreError;
use crate::types::OperationId;

/// Query parameter carrying the credential on push transports.
pub const TOKEN_PARAM: &str = "token";

/// `GET {api}/progress/{id}/stream?token=...` (Server-Sent Events).
pub fn progress_stream_url(
    api_url: &str,
    operation_id: &OperationId,
    credential: &str,
) -> Result<Url, CoreError> {
    let mut url = join(api_url, &["progress", operation_id.as_str(), "stream"])?;
    url.query_pairs_mut().append_pair(TOKEN_PARAM, credential);
    Ok(url)
}

/// `GET {api}/progress/{id}`, polled when the stream is unavailable.
pub fn progress_poll_url(api_url: &str, operation_id: &OperationId) -> Result<Url, CoreError> {
    join(api_url, &["progress", operation_id.as_str()])
}

/// `POST {api}/leads/import`.
pub fn import_url(api_url: &str) -> Result<Url, CoreError> {
    join(api_url, &["leads", "import"])
}

/// Session event bus URL with the credential attached.
pub fn bus_url(ws_url: &str, credential: &str) -> Result<Url, CoreError> {
    let mut url = Url::parse(ws_url)?;
    url.query_pairs_mut().append_pair(TOKEN_PARAM, credential);
    Ok(url)
}

fn join(base: &str, segments: &[&str]) -> Result<Url, CoreError> {
    let mut url = Url::parse(base)?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| CoreError::Validation(format!("{base} cannot be used as a base URL")))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_carries_token() {
        let url = progress_stream_url(
            "https://app.example.com/api",
            &OperationId::new("op-1"),
            "secret",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.example.com/api/progress/op-1/stream?token=secret"
        );
    }

    #[test]
    fn operation_id_is_percent_encoded() {
        let url = progress_poll_url("http://localhost:8000/api/", &OperationId::new("a/b c")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/progress/a%2Fb%20c");
    }

    #[test]
    fn token_is_query_encoded() {
        let url = bus_url("wss://app.example.com/ws", "a+b=c").unwrap();
        assert_eq!(url.as_str(), "wss://app.example.com/ws?token=a%2Bb%3Dc");
    }

    #[test]
    fn import_url_is_joined() {
        let url = import_url("http://localhost:8000/api").unwrap();
        assert_eq!(url.path(), "/api/leads/import");
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(import_url("not a url").is_err());
    }
}
