use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Response, Url};
use tracing::debug;

use super::error::NetworkError;

/// The network boundary. One call, one request; no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET path`, returning the raw success body.
    async fn get(&self, path: &str) -> Result<Bytes, NetworkError>;

    /// `POST path` with a JSON body, returning the raw success body.
    async fn post(&self, path: &str, payload: &serde_json::Value) -> Result<Bytes, NetworkError>;
}

/// [`Transport`] over HTTP, rooted at the API base URL.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("marketsync/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a key path against the base URL, keeping any base path prefix.
    pub fn url(&self, path: &str) -> Result<Url, NetworkError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(NetworkError::Url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, NetworkError> {
        let url = self.url(path)?;
        debug!(method = %method, url = %url, "Sending request");

        let mut req = self.client.request(method, url);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        Self::handle(resp).await
    }

    async fn handle(resp: Response) -> Result<Bytes, NetworkError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(bytes)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Bytes, NetworkError> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, payload: &serde_json::Value) -> Result<Bytes, NetworkError> {
        self.send(Method::POST, path, Some(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(&server.base_url(), Duration::from_secs(5)).expect("transport")
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let t = HttpTransport::new("https://market.example/shop", Duration::from_secs(1))
            .expect("transport");
        let url = t.url("/api/products/7").expect("url");
        assert_eq!(url.as_str(), "https://market.example/shop/api/products/7");
    }

    #[test]
    fn url_preserves_encoded_segments() {
        let t = HttpTransport::new("https://market.example", Duration::from_secs(1))
            .expect("transport");
        let url = t.url("/api/products/a%2Fb").expect("url");
        assert_eq!(url.path(), "/api/products/a%2Fb");
    }

    #[test]
    fn rejects_invalid_base() {
        let err = HttpTransport::new("not a url", Duration::from_secs(1)).expect_err("invalid");
        assert!(matches!(err, NetworkError::Url(_)));
    }

    #[tokio::test]
    async fn get_returns_success_body() -> Result<(), NetworkError> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET").path("/api/products/7");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true}"#);
        });

        let body = transport(&server).get("/api/products/7").await?;
        mock.assert();
        assert_eq!(&body[..], br#"{"ok":true}"#);
        Ok(())
    }

    #[tokio::test]
    async fn post_sends_json_body() -> Result<(), NetworkError> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/products/7/fav")
                .json_body(serde_json::json!({}));
            then.status(200).body(r#"{"ok":true}"#);
        });

        transport(&server)
            .post("/api/products/7/fav", &serde_json::json!({}))
            .await?;
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/products/404");
            then.status(404).body("missing");
        });

        let err = transport(&server)
            .get("/api/products/404")
            .await
            .expect_err("404 should fail");
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("missing"));
    }
}
