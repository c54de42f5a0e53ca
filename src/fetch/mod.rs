//! Resource fetching.
//!
//! [`FetchManager`] sits between the capture pipeline and a
//! [`ResourceFetcher`] transport. Callers always get a [`ResourceRecord`]
//! back, never an error: failures become degraded records the inliners turn
//! into placeholders or dropped layers. The manager adds what transports do
//! not provide: data-URL short-circuiting, proxy templating, success
//! memoization, failure memoization with a TTL, inflight deduplication, and
//! deduplicated warning logs.

pub mod data_url;
mod logger;
mod transport;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;

pub use logger::SessionLogger;
pub use transport::{
    DEFAULT_USER_AGENT, FetchFailure, FetchRequest, RawResource, ResourceFetcher, StaticFetcher,
};

#[cfg(not(target_arch = "wasm32"))]
pub use transport::HttpFetcher;

use crate::util::{decode_text, detect_mime_type, lock_unpoisoned, now_ms};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
/// Default window during which a failed fetch is not retried.
pub const DEFAULT_ERROR_TTL_MS: u64 = 8000;

// ============================================================================
// Records
// ============================================================================

/// Shape the caller wants the payload in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsKind {
    Text,
    Blob,
    DataUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone)]
pub enum ResourceData {
    Text(String),
    Blob(Vec<u8>),
    DataUrl(String),
}

/// Outcome of a fetch. `from_cache` marks both memoized successes and
/// TTL-suppressed failures.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub url: String,
    pub data: Option<ResourceData>,
    pub status: FetchStatus,
    pub reason: Option<String>,
    pub from_cache: bool,
    pub mime: Option<String>,
}

impl ResourceRecord {
    pub fn failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data: None,
            status: FetchStatus::Error,
            reason: Some(reason.into()),
            from_cache: false,
            mime: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            Some(ResourceData::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            Some(ResourceData::Blob(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_data_url(&self) -> Option<&str> {
        match &self.data {
            Some(ResourceData::DataUrl(url)) => Some(url),
            _ => None,
        }
    }
}

/// Cookie policy forwarded to the transport. Derived from origin comparison
/// when the caller does not pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Include,
    Omit,
}

/// Per-call fetch parameters.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub as_kind: AsKind,
    pub timeout_ms: u64,
    pub use_proxy: String,
    pub error_ttl_ms: u64,
    /// Suppress warning logs for this call.
    pub silent: bool,
    pub headers: Vec<(String, String)>,
    /// Pin the cookie policy instead of deriving it from origins.
    pub credentials: Option<Credentials>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            as_kind: AsKind::DataUrl,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            use_proxy: String::new(),
            error_ttl_ms: DEFAULT_ERROR_TTL_MS,
            silent: false,
            headers: Vec::new(),
            credentials: None,
        }
    }
}

impl FetchOptions {
    pub fn text() -> Self {
        Self {
            as_kind: AsKind::Text,
            ..Self::default()
        }
    }

    pub fn blob() -> Self {
        Self {
            as_kind: AsKind::Blob,
            ..Self::default()
        }
    }

    pub fn data_url() -> Self {
        Self {
            as_kind: AsKind::DataUrl,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_proxy(mut self, template: impl Into<String>) -> Self {
        self.use_proxy = template.into();
        self
    }

    pub fn with_error_ttl(mut self, ms: u64) -> Self {
        self.error_ttl_ms = ms;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Memoization key. Two fetches share an inflight future and cache entries
/// only when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    as_kind: AsKind,
    url: String,
    timeout_ms: u64,
    proxy: String,
    error_ttl_ms: u64,
}

struct FailureEntry {
    expires_at: u64,
    reason: String,
}

type SharedFetch = futures::future::Shared<BoxFuture<'static, ResourceRecord>>;

/// Process-wide fetch front end. Shared by captures through the runtime.
pub struct FetchManager {
    transport: Arc<dyn ResourceFetcher>,
    inflight: Mutex<HashMap<FetchKey, SharedFetch>>,
    resources: Mutex<HashMap<FetchKey, ResourceRecord>>,
    failures: Mutex<HashMap<FetchKey, FailureEntry>>,
    logger: SessionLogger,
    page_origin: Mutex<Option<String>>,
}

impl FetchManager {
    pub fn new(transport: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            transport,
            inflight: Mutex::new(HashMap::new()),
            resources: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            logger: SessionLogger::new(),
            page_origin: Mutex::new(None),
        }
    }

    /// Origin used for same-origin credential derivation, usually the
    /// captured document's base URL.
    pub fn set_page_origin(&self, origin: Option<String>) {
        *lock_unpoisoned(&self.page_origin) = origin;
    }

    /// Fetch a resource. Always resolves with a record; see module docs.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> ResourceRecord {
        if data_url::is_data_url(url) {
            return resolve_data_url(url, options.as_kind);
        }

        let key = FetchKey {
            as_kind: options.as_kind,
            url: url.to_string(),
            timeout_ms: options.timeout_ms,
            proxy: options.use_proxy.clone(),
            error_ttl_ms: options.error_ttl_ms,
        };

        if let Some(mut hit) = lock_unpoisoned(&self.resources).get(&key).cloned() {
            hit.from_cache = true;
            return hit;
        }

        {
            let mut failures = lock_unpoisoned(&self.failures);
            if let Some(entry) = failures.get(&key) {
                if now_ms() < entry.expires_at {
                    let mut record = ResourceRecord::failed(url, entry.reason.clone());
                    record.from_cache = true;
                    return record;
                }
                failures.remove(&key);
            }
        }

        let fut = {
            let mut inflight = lock_unpoisoned(&self.inflight);
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let transport = Arc::clone(&self.transport);
                    let request = FetchRequest {
                        url: apply_proxy(url, &options.use_proxy),
                        headers: options.headers.clone(),
                        timeout_ms: options.timeout_ms,
                        credentials: options
                            .credentials
                            .unwrap_or_else(|| self.derive_credentials(url)),
                    };
                    let source_url = url.to_string();
                    let as_kind = options.as_kind;
                    let driven: BoxFuture<'static, ResourceRecord> =
                        Box::pin(async move { drive(transport, source_url, as_kind, request).await });
                    let shared = driven.shared();
                    inflight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let record = fut.await;

        lock_unpoisoned(&self.inflight).remove(&key);
        match record.status {
            FetchStatus::Ok => {
                lock_unpoisoned(&self.resources).insert(key, record.clone());
            }
            FetchStatus::Error => {
                // Blob URL failures are environment-specific; retry freely.
                if !url.starts_with("blob:") && options.error_ttl_ms > 0 {
                    let reason = record
                        .reason
                        .clone()
                        .unwrap_or_else(|| "error".to_string());
                    lock_unpoisoned(&self.failures).insert(
                        key,
                        FailureEntry {
                            expires_at: now_ms() + options.error_ttl_ms,
                            reason,
                        },
                    );
                }
                if !options.silent {
                    self.logger.warn_failure(
                        record.reason.as_deref().unwrap_or("error"),
                        options.as_kind,
                        url,
                    );
                }
            }
        }
        record
    }

    /// Drop memoized successes and failures.
    pub fn clear_resources(&self) {
        lock_unpoisoned(&self.resources).clear();
        lock_unpoisoned(&self.failures).clear();
    }

    /// Reset the warning dedup window.
    pub fn reset_session(&self) {
        self.logger.reset();
    }

    pub(crate) fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    fn derive_credentials(&self, url: &str) -> Credentials {
        if !url.contains("://") {
            return Credentials::Include;
        }
        match lock_unpoisoned(&self.page_origin).as_deref() {
            Some(origin) if origin_of(url) == origin => Credentials::Include,
            _ => Credentials::Omit,
        }
    }
}

impl Default for FetchManager {
    fn default() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Self::new(Arc::new(HttpFetcher::new()))
        }
        #[cfg(target_arch = "wasm32")]
        {
            Self::new(Arc::new(StaticFetcher::new()))
        }
    }
}

async fn drive(
    transport: Arc<dyn ResourceFetcher>,
    source_url: String,
    as_kind: AsKind,
    request: FetchRequest,
) -> ResourceRecord {
    match transport.fetch_raw(request).await {
        Ok(raw) => build_record(source_url, as_kind, raw),
        Err(failure) => ResourceRecord::failed(source_url, failure.reason),
    }
}

fn build_record(url: String, as_kind: AsKind, raw: RawResource) -> ResourceRecord {
    let header_mime = raw
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|s| s.contains('/'))
        .map(|s| s.to_string());
    let mime = header_mime.or_else(|| detect_mime_type(&url, &raw.bytes).map(|s| s.to_string()));
    let charset = raw.content_type.as_deref().and_then(charset_of);

    let data = match as_kind {
        AsKind::Text => {
            ResourceData::Text(decode_text(&raw.bytes, charset.as_deref()).into_owned())
        }
        AsKind::Blob => ResourceData::Blob(raw.bytes),
        AsKind::DataUrl => ResourceData::DataUrl(data_url::encode(
            &raw.bytes,
            mime.as_deref().unwrap_or("application/octet-stream"),
        )),
    };

    ResourceRecord {
        url,
        data: Some(data),
        status: FetchStatus::Ok,
        reason: None,
        from_cache: false,
        mime,
    }
}

fn resolve_data_url(url: &str, as_kind: AsKind) -> ResourceRecord {
    if as_kind == AsKind::DataUrl {
        return ResourceRecord {
            url: url.to_string(),
            mime: data_url::mime_of(url),
            data: Some(ResourceData::DataUrl(url.to_string())),
            status: FetchStatus::Ok,
            reason: None,
            from_cache: false,
        };
    }
    let (bytes, mime) = match data_url::decode(url) {
        Ok(decoded) => decoded,
        Err(e) => return ResourceRecord::failed(url, format!("invalid data url: {e}")),
    };
    let data = match as_kind {
        AsKind::Text => ResourceData::Text(decode_text(&bytes, None).into_owned()),
        _ => ResourceData::Blob(bytes),
    };
    ResourceRecord {
        url: url.to_string(),
        data: Some(data),
        status: FetchStatus::Ok,
        reason: None,
        from_cache: false,
        mime,
    }
}

fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

// ============================================================================
// Proxy and origin helpers
// ============================================================================

/// Origin (`scheme://host:port`) of a URL. Opaque-origin schemes reduce to
/// the scheme; unparseable inputs fall back to the input sans query.
pub(crate) fn origin_of(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let origin = parsed.origin();
        if matches!(origin, url::Origin::Tuple(..)) {
            return origin.ascii_serialization();
        }
        return format!("{}:", parsed.scheme());
    }
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

/// Route a URL through the proxy template, or return it unchanged when
/// proxying does not apply.
pub(crate) fn apply_proxy(url: &str, template: &str) -> String {
    if template.is_empty() || !should_proxy(url, template) {
        return url.to_string();
    }
    let encoded = crate::util::encode_uri_component(url);
    if template.contains("{url}") {
        template.replace("{url}", &encoded)
    } else if template.ends_with('?') {
        format!("{template}url={encoded}")
    } else if template.ends_with('/') {
        format!("{template}{encoded}")
    } else if template.contains('?') {
        format!("{template}&url={encoded}")
    } else {
        format!("{template}?url={encoded}")
    }
}

fn should_proxy(url: &str, template: &str) -> bool {
    // Only network URLs benefit from a CORS proxy.
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }
    // Already on the proxy origin.
    if origin_of(url) == origin_of(template) {
        return false;
    }
    // Already carried by a proxy-style query.
    if let Ok(parsed) = url::Url::parse(url)
        && parsed
            .query_pairs()
            .any(|(name, _)| name == "url" || name == "target")
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct YieldingFetcher {
        hits: AtomicUsize,
    }

    impl ResourceFetcher for YieldingFetcher {
        fn fetch_raw(
            &self,
            _request: FetchRequest,
        ) -> BoxFuture<'_, Result<RawResource, FetchFailure>> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(RawResource {
                    bytes: b"payload".to_vec(),
                    content_type: Some("image/png".to_string()),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_data_url_short_circuits_transport() {
        let transport = Arc::new(StaticFetcher::new());
        let manager = FetchManager::new(transport.clone());
        let record = manager
            .fetch("data:image/png;base64,aGVsbG8=", &FetchOptions::blob())
            .await;
        assert!(record.is_ok());
        assert_eq!(record.as_bytes(), Some(b"hello".as_slice()));
        assert_eq!(record.mime.as_deref(), Some("image/png"));
        assert_eq!(transport.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_data_url_passthrough_for_data_url_kind() {
        let manager = FetchManager::new(Arc::new(StaticFetcher::new()));
        let url = "data:image/gif;base64,R0lGOD";
        let record = manager.fetch(url, &FetchOptions::data_url()).await;
        assert_eq!(record.as_data_url(), Some(url));
    }

    #[tokio::test]
    async fn test_success_memoized() {
        let transport = Arc::new(
            StaticFetcher::new().with("https://x.test/a.png", b"bytes".to_vec(), Some("image/png")),
        );
        let manager = FetchManager::new(transport.clone());
        let opts = FetchOptions::data_url();

        let first = manager.fetch("https://x.test/a.png", &opts).await;
        assert!(first.is_ok());
        assert!(!first.from_cache);
        assert!(first.as_data_url().is_some_and(|u| u.starts_with("data:image/png;base64,")));

        let second = manager.fetch("https://x.test/a.png", &opts).await;
        assert!(second.is_ok());
        assert!(second.from_cache);
        assert_eq!(transport.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_error_ttl_suppresses_refetch() {
        let transport = Arc::new(StaticFetcher::new());
        let manager = FetchManager::new(transport.clone());
        let opts = FetchOptions::data_url().with_error_ttl(60_000).silent();

        let first = manager.fetch("https://x.test/missing.png", &opts).await;
        assert!(!first.is_ok());
        assert!(!first.from_cache);

        let second = manager.fetch("https://x.test/missing.png", &opts).await;
        assert!(!second.is_ok());
        assert!(second.from_cache);
        assert_eq!(second.reason.as_deref(), Some("not found"));
        assert_eq!(transport.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_error_ttl_refetches() {
        let transport = Arc::new(StaticFetcher::new());
        let manager = FetchManager::new(transport.clone());
        let opts = FetchOptions::data_url().with_error_ttl(0).silent();

        manager.fetch("https://x.test/missing.png", &opts).await;
        manager.fetch("https://x.test/missing.png", &opts).await;
        assert_eq!(transport.hit_count(), 2);
    }

    #[tokio::test]
    async fn test_inflight_dedup_shares_one_request() {
        let transport = Arc::new(YieldingFetcher {
            hits: AtomicUsize::new(0),
        });
        let manager = FetchManager::new(transport.clone());
        let opts = FetchOptions::data_url();

        let (a, b) = futures::join!(
            manager.fetch("https://x.test/shared.png", &opts),
            manager.fetch("https://x.test/shared.png", &opts)
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_text_fetch_honors_charset() {
        let transport = Arc::new(StaticFetcher::new().with(
            "https://x.test/style.css",
            vec![0x68, 0xE9],
            Some("text/css; charset=windows-1252"),
        ));
        let manager = FetchManager::new(transport);
        let record = manager
            .fetch("https://x.test/style.css", &FetchOptions::text())
            .await;
        assert_eq!(record.as_text(), Some("hé"));
        assert_eq!(record.mime.as_deref(), Some("text/css"));
    }

    #[tokio::test]
    async fn test_silent_fetch_skips_logger() {
        let manager = FetchManager::new(Arc::new(StaticFetcher::new()));
        manager
            .fetch("https://x.test/a", &FetchOptions::data_url().silent())
            .await;
        assert_eq!(manager.logger().emitted(), 0);
        manager.fetch("https://x.test/b", &FetchOptions::data_url()).await;
        assert_eq!(manager.logger().emitted(), 1);
    }

    #[test]
    fn test_apply_proxy_templates() {
        let enc = "https%3A%2F%2Fa.test%2Fx.png";
        assert_eq!(
            apply_proxy("https://a.test/x.png", "https://p.test/fetch?target={url}"),
            format!("https://p.test/fetch?target={enc}")
        );
        assert_eq!(
            apply_proxy("https://a.test/x.png", "https://p.test/fetch?"),
            format!("https://p.test/fetch?url={enc}")
        );
        assert_eq!(
            apply_proxy("https://a.test/x.png", "https://p.test/fetch/"),
            format!("https://p.test/fetch/{enc}")
        );
        assert_eq!(
            apply_proxy("https://a.test/x.png", "https://p.test/fetch?mode=raw"),
            format!("https://p.test/fetch?mode=raw&url={enc}")
        );
        assert_eq!(
            apply_proxy("https://a.test/x.png", "https://p.test/fetch"),
            format!("https://p.test/fetch?url={enc}")
        );
    }

    #[test]
    fn test_apply_proxy_skips() {
        let template = "https://p.test/fetch?";
        // Empty template
        assert_eq!(apply_proxy("https://a.test/x", ""), "https://a.test/x");
        // Special schemes
        assert_eq!(apply_proxy("data:image/png;base64,AA", template), "data:image/png;base64,AA");
        assert_eq!(apply_proxy("blob:abc", template), "blob:abc");
        // Already on the proxy origin
        assert_eq!(
            apply_proxy("https://p.test/other", template),
            "https://p.test/other"
        );
        // Already carrying a url=/target= query
        assert_eq!(
            apply_proxy("https://a.test/r?url=inner", template),
            "https://a.test/r?url=inner"
        );
        assert_eq!(
            apply_proxy("https://a.test/r?target=inner", template),
            "https://a.test/r?target=inner"
        );
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(origin_of("https://a.test:8080/x/y?z"), "https://a.test:8080");
        assert_eq!(origin_of("data:image/png;base64,AA"), "data:");
    }
}
