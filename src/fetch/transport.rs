//! Fetch transports.
//!
//! The [`ResourceFetcher`] trait keeps the pipeline agnostic about how bytes
//! arrive: real HTTP on native targets, an in-memory map for tests and wasm,
//! or anything the host supplies behind an `Arc<dyn ResourceFetcher>`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;

use crate::fetch::Credentials;

/// Default User-Agent string used by HTTP transports.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 snapdom/0.2";

/// A fully resolved request handed to a transport. Proxying and credential
/// derivation happen before this point.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: u64,
    pub credentials: Credentials,
}

/// Raw transport response: bytes plus the Content-Type header if one came.
#[derive(Debug, Clone)]
pub struct RawResource {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Why a transport could not produce bytes. `reason` feeds the resource
/// record and the session logger; "timeout" is recognized specially.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub reason: String,
}

impl FetchFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new("timeout")
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Transport abstraction. Implementations enforce their own timeout from
/// `request.timeout_ms`; a lapsed timeout must fail with reason "timeout".
pub trait ResourceFetcher: Send + Sync {
    fn fetch_raw(&self, request: FetchRequest) -> BoxFuture<'_, Result<RawResource, FetchFailure>>;
}

impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    fn fetch_raw(&self, request: FetchRequest) -> BoxFuture<'_, Result<RawResource, FetchFailure>> {
        (**self).fetch_raw(request)
    }
}

// ============================================================================
// HTTP transport (native)
// ============================================================================

/// HTTP(S) transport over a shared reqwest client. Also serves `file://`
/// URLs so captures of local HTML files resolve their relative assets.
#[cfg(not(target_arch = "wasm32"))]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn fetch_file(path: &str) -> Result<RawResource, FetchFailure> {
        let bytes =
            std::fs::read(path).map_err(|e| FetchFailure::new(format!("file: {e}")))?;
        let content_type = crate::util::detect_mime_type(path, &bytes).map(|s| s.to_string());
        Ok(RawResource {
            bytes,
            content_type,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ResourceFetcher for HttpFetcher {
    fn fetch_raw(&self, request: FetchRequest) -> BoxFuture<'_, Result<RawResource, FetchFailure>> {
        Box::pin(async move {
            if let Some(path) = request.url.strip_prefix("file://") {
                return Self::fetch_file(path);
            }
            if request.url.starts_with("blob:") {
                // Blob URLs only resolve inside the environment that minted
                // them; there is nothing to dial from here.
                return Err(FetchFailure::new("blob unavailable"));
            }
            if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
                return Err(FetchFailure::new("unsupported scheme"));
            }

            let mut builder = self
                .client
                .get(&request.url)
                .timeout(std::time::Duration::from_millis(request.timeout_ms));
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchFailure::new(format!("http {}", status.as_u16())));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
            Ok(RawResource {
                bytes: bytes.to_vec(),
                content_type,
            })
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn classify_reqwest_error(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::timeout()
    } else {
        FetchFailure::new(format!("network: {err}"))
    }
}

// ============================================================================
// Static transport (tests, wasm)
// ============================================================================

/// In-memory transport answering from a fixed URL map. Unknown URLs fail
/// with "not found". Counts transport hits for cache assertions.
#[derive(Default)]
pub struct StaticFetcher {
    entries: HashMap<String, RawResource>,
    hits: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        url: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        self.insert(url, bytes, content_type);
        self
    }

    pub fn insert(
        &mut self,
        url: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) {
        self.entries.insert(
            url.into(),
            RawResource {
                bytes: bytes.into(),
                content_type: content_type.map(|s| s.to_string()),
            },
        );
    }

    /// Number of requests that reached this transport.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

impl ResourceFetcher for StaticFetcher {
    fn fetch_raw(&self, request: FetchRequest) -> BoxFuture<'_, Result<RawResource, FetchFailure>> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let result = match self.entries.get(&request.url) {
            Some(resource) => Ok(resource.clone()),
            None => Err(FetchFailure::new("not found")),
        };
        Box::pin(futures::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> FetchRequest {
        FetchRequest {
            url: url.to_string(),
            headers: Vec::new(),
            timeout_ms: 1000,
            credentials: Credentials::Omit,
        }
    }

    #[tokio::test]
    async fn test_static_fetcher_serves_entries() {
        let fetcher = StaticFetcher::new().with("https://x.test/a.png", b"bytes".to_vec(), Some("image/png"));
        let raw = fetcher.fetch_raw(request("https://x.test/a.png")).await.unwrap();
        assert_eq!(raw.bytes, b"bytes");
        assert_eq!(raw.content_type.as_deref(), Some("image/png"));
        assert_eq!(fetcher.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_static_fetcher_misses_fail() {
        let fetcher = StaticFetcher::new();
        let err = fetcher.fetch_raw(request("https://x.test/missing")).await.unwrap_err();
        assert_eq!(err.reason, "not found");
    }

    #[tokio::test]
    async fn test_http_fetcher_reads_file_urls() {
        use std::io::Write as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();

        let fetcher = HttpFetcher::new();
        let url = format!("file://{}", path.display());
        let raw = fetcher.fetch_raw(request(&url)).await.unwrap();
        assert_eq!(raw.bytes[..4], [0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(raw.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_unknown_schemes() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch_raw(request("ftp://x.test/a")).await.unwrap_err();
        assert_eq!(err.reason, "unsupported scheme");
    }
}
