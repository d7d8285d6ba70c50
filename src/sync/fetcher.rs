use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cache::CacheKey;
use crate::infra::http::{NetworkError, Transport};

/// Performs one read for a key and decodes the body.
///
/// Stateless: it never touches the cache. Writing the result back is the revalidation's job.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn fetch<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, NetworkError> {
        let path = key.path().ok_or(NetworkError::InactiveKey)?;
        let body = self.transport.get(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde::Deserialize;

    use super::*;
    use crate::cache::{Params, PathTemplate};

    struct Fixed(&'static str);

    #[async_trait]
    impl Transport for Fixed {
        async fn get(&self, _path: &str) -> Result<Bytes, NetworkError> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }

        async fn post(
            &self,
            _path: &str,
            _payload: &serde_json::Value,
        ) -> Result<Bytes, NetworkError> {
            Ok(Bytes::new())
        }
    }

    #[derive(Debug, Deserialize)]
    struct Ack {
        ok: bool,
    }

    fn key() -> CacheKey {
        PathTemplate::parse("/api/products/{id}")
            .expect("template")
            .derive(&Params::new().with("id", "1"))
    }

    #[tokio::test]
    async fn decodes_body() -> Result<(), NetworkError> {
        let fetcher = Fetcher::new(Arc::new(Fixed(r#"{"ok":true}"#)));
        let ack: Ack = fetcher.fetch(&key()).await?;
        assert!(ack.ok);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let fetcher = Fetcher::new(Arc::new(Fixed("<html>")));
        let err = fetcher
            .fetch::<Ack>(&key())
            .await
            .expect_err("html should not decode");
        assert!(matches!(err, NetworkError::Decode(_)));
    }

    #[tokio::test]
    async fn inactive_key_never_reaches_transport() {
        let fetcher = Fetcher::new(Arc::new(Fixed(r#"{"ok":true}"#)));
        let err = fetcher
            .fetch::<Ack>(&CacheKey::Inactive)
            .await
            .expect_err("inactive key");
        assert!(matches!(err, NetworkError::InactiveKey));
    }
}
