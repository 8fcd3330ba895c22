//! Remote image resolution into embeddable data URIs.
//!
//! Every product frame embeds its images inline so the browser never fetches
//! over the network during a render. Resolution degrades instead of failing:
//! any fetch problem yields the fixed 1x1 transparent PNG, keeping the
//! render pipeline total.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as Base64Engine;
use log::{debug, warn};

use crate::error::{Error, Result};

/// 1x1 transparent PNG, base64. Shared fallback for every resolution
/// failure; never mutated.
pub const TRANSPARENT_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGMAAQAABQABDQottAAAAABJRU5ErkJggg==";

/// The fallback as a ready-to-embed data URI.
pub const TRANSPARENT_DATA_URI: &str =
    "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGMAAQAABQABDQottAAAAABJRU5ErkJggg==";

/// Decoded fallback bytes, for endpoints that serve the PNG directly.
pub fn transparent_png_bytes() -> Vec<u8> {
    // The constant is well-formed base64; decoding cannot fail.
    STANDARD.decode(TRANSPARENT_PNG_B64).unwrap_or_default()
}

/// Hard ceiling on fetched payloads. Bounds peak memory during base64
/// inflation and the browser-side decode.
const MAX_IMAGE_BYTES: usize = 6_000_000;

/// An image fetched from a remote URL, ready for embedding.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub mime: String,
    pub payload: Vec<u8>,
    pub source_url: String,
}

impl ResolvedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.payload))
    }
}

/// Request identity and limits for outbound image fetches.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Referer header sent with fetches; matches the upstream shop.
    pub referer: String,
    /// Origin header sent with fetches.
    pub origin: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            referer: String::new(),
            origin: String::new(),
            timeout: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(600),
            cache_capacity: 128,
        }
    }
}

struct CacheEntry {
    mime: String,
    payload: Vec<u8>,
    stored_at: Instant,
}

/// Resolves remote image URLs into inline data URIs, with a time-bounded
/// in-memory cache. The cache is advisory: with or without it the same
/// bytes come back, only latency changes.
pub struct ImageResolver {
    client: reqwest::Client,
    config: ResolverConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ImageResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config, cache: Mutex::new(HashMap::new()) })
    }

    /// Resolve a URL into an embeddable representation. Never fails: empty
    /// input, fetch errors, error content types and oversized payloads all
    /// degrade to the transparent fallback. `data:` input passes through.
    pub async fn resolve(&self, url: &str) -> String {
        if url.is_empty() {
            return TRANSPARENT_DATA_URI.to_string();
        }
        if url.starts_with("data:") {
            return url.to_string();
        }

        match self.fetch(url).await {
            Ok(image) => image.to_data_uri(),
            Err(e) => {
                warn!("image resolution failed for {}: {}", url, e);
                TRANSPARENT_DATA_URI.to_string()
            }
        }
    }

    /// Fetch an image with a browser-like request identity. One retry on
    /// transport errors; status, content-type and size checks apply to the
    /// final response.
    pub async fn fetch(&self, url: &str) -> Result<ResolvedImage> {
        if let Some(hit) = self.cache_get(url) {
            debug!("image cache hit for {}", url);
            return Ok(hit);
        }

        let response = match self.get(url).await {
            Ok(r) => r,
            Err(first) => {
                debug!("retrying image fetch for {} after: {}", url, first);
                self.get(url).await.map_err(|e| Error::Fetch(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned status {}", url, status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if is_error_content_type(&content_type) {
            return Err(Error::Fetch(format!("{} returned non-image content type {}", url, content_type)));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_IMAGE_BYTES {
                return Err(Error::Fetch(format!("{} exceeds size ceiling ({} bytes)", url, len)));
            }
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?
            .to_vec();
        if payload.len() > MAX_IMAGE_BYTES {
            return Err(Error::Fetch(format!("{} exceeds size ceiling ({} bytes)", url, payload.len())));
        }

        let mime = guess_mime(url, &content_type);
        let image = ResolvedImage { mime, payload, source_url: url.to_string() };
        self.cache_put(url, &image);
        Ok(image)
    }

    async fn get(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .client
            .get(url)
            .header(
                reqwest::header::USER_AGENT,
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome Safari",
            )
            .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
            .header(reqwest::header::ACCEPT_LANGUAGE, "tr-TR,tr;q=0.9,en;q=0.8");
        if !self.config.referer.is_empty() {
            request = request.header(reqwest::header::REFERER, self.config.referer.clone());
        }
        if !self.config.origin.is_empty() {
            request = request.header(reqwest::header::ORIGIN, self.config.origin.clone());
        }
        request.send().await
    }

    fn cache_get(&self, url: &str) -> Option<ResolvedImage> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(url)?;
        if entry.stored_at.elapsed() > self.config.cache_ttl {
            return None;
        }
        Some(ResolvedImage {
            mime: entry.mime.clone(),
            payload: entry.payload.clone(),
            source_url: url.to_string(),
        })
    }

    fn cache_put(&self, url: &str, image: &ResolvedImage) {
        let mut cache = match self.cache.lock() {
            Ok(c) => c,
            Err(_) => return,
        };
        if cache.len() >= self.config.cache_capacity {
            // Full-clear eviction keeps the bound simple; the cache is
            // advisory and repopulates on demand.
            cache.clear();
        }
        cache.insert(
            url.to_string(),
            CacheEntry {
                mime: image.mime.clone(),
                payload: image.payload.clone(),
                stored_at: Instant::now(),
            },
        );
    }
}

/// Textual content types are error pages in disguise, not images.
fn is_error_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    if ct.contains("image/") {
        return false;
    }
    ct.starts_with("text/") || ct.contains("html") || ct.contains("json") || ct.contains("xml")
}

/// MIME type from the response header when it names an image subtype,
/// otherwise inferred from the URL's extension, defaulting to JPEG.
pub fn guess_mime(url: &str, content_type: &str) -> String {
    if content_type.contains("image/") {
        if let Some(main) = content_type.split(';').next() {
            return main.trim().to_string();
        }
    }
    let u = url.to_lowercase();
    if u.contains(".png") {
        "image/png".to_string()
    } else if u.contains(".webp") {
        "image/webp".to_string()
    } else if u.contains(".svg") {
        "image/svg+xml".to_string()
    } else {
        "image/jpeg".to_string()
    }
}
