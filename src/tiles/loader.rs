use crate::tiles::tile::TileIndex;
use crate::traits::TileFetcher;
use crate::FetchError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Payload of a fetched tile, shared by every handle to it
pub type TileData = Arc<Vec<u8>>;

/// Everything a fetcher needs to retrieve one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Logical index, possibly outside the world on wrapped axes
    pub index: TileIndex,
    /// Index the content is actually taken from
    pub source: TileIndex,
    pub url: String,
}

/// Fetcher backed by a closure, for generated or in-memory tiles
pub struct FnFetcher<F>
where
    F: Fn(TileRequest) -> BoxFuture<'static, Result<TileData, FetchError>> + Send + Sync,
{
    fetch: F,
}

impl<F> FnFetcher<F>
where
    F: Fn(TileRequest) -> BoxFuture<'static, Result<TileData, FetchError>> + Send + Sync,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F> TileFetcher for FnFetcher<F>
where
    F: Fn(TileRequest) -> BoxFuture<'static, Result<TileData, FetchError>> + Send + Sync,
{
    async fn fetch(&self, request: &TileRequest) -> Result<TileData, FetchError> {
        (self.fetch)(request.clone()).await
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpTileFetcher;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use once_cell::sync::Lazy;
    use std::time::Duration;

    /// Shared async HTTP client for tile fetching
    static HTTP_CLIENT: Lazy<Result<reqwest::Client, String>> = Lazy::new(|| {
        reqwest::Client::builder()
            .user_agent(concat!("tilescape/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| e.to_string())
    });

    /// Downloads tiles over HTTP(S) using the request url
    #[derive(Debug, Clone)]
    pub struct HttpTileFetcher {
        client: reqwest::Client,
        timeout: Duration,
    }

    impl HttpTileFetcher {
        /// Uses the process-wide shared client
        pub fn shared() -> crate::Result<Self> {
            let client = HTTP_CLIENT
                .as_ref()
                .map_err(|e| crate::Error::Config(format!("HTTP client unavailable: {e}")))?;
            Ok(Self::with_client(client.clone()))
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self {
                client,
                timeout: Duration::from_secs(10),
            }
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }
    }

    #[async_trait]
    impl TileFetcher for HttpTileFetcher {
        async fn fetch(&self, request: &TileRequest) -> Result<TileData, FetchError> {
            let response = self
                .client
                .get(&request.url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(FetchError::Http {
                    status: response.status().as_u16(),
                    url: request.url.clone(),
                });
            }

            let data = response
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(Arc::new(data.to_vec()))
        }
    }
}
