//! HTTP surface of the render service.
//!
//! Four endpoints: `/render.png` (never errors to the client; worst case a
//! transparent PNG), `/feed.xml` (hard 502 when the upstream feed cannot be
//! fetched), `/probe` (fetch diagnostics) and `/static/{file}` for the
//! bundled assets, plus a conventional `/health`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as Base64Engine;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::chrome::ChromeDriver;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{rewrite_feed, FeedRewriteOptions};
use crate::renderer::FrameRenderer;
use crate::resolve::{transparent_png_bytes, ImageResolver, ResolverConfig};
use crate::supervisor::Supervisor;
use crate::template::{FrameTemplate, FrameValues};
use crate::text::{discount_percent, format_currency_label, title_case, visibility_flags};
use crate::{RenderRequest, Theme, Viewport};

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Shared service state.
pub struct AppState {
    pub config: Config,
    pub resolver: ImageResolver,
    pub renderer: FrameRenderer<ChromeDriver>,
    pub template: FrameTemplate,
    http: reqwest::Client,
    resolver_identity: ResolverConfig,
}

impl AppState {
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let resolver_identity = config.resolver_config();
        let resolver = ImageResolver::new(resolver_identity.clone())?;
        let template = FrameTemplate::load(&config.asset_dir)?;
        let supervisor = Arc::new(Supervisor::new(|| Ok(ChromeDriver)));
        let renderer = FrameRenderer::new(supervisor, config.render_concurrency);
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Arc::new(Self { config, resolver, renderer, template, http, resolver_identity }))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/render.png", get(render_png))
        .route("/feed.xml", get(feed_xml))
        .route("/probe", get(probe))
        .route("/static/:file", get(static_asset))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn render_png(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(request): Query<RenderRequest>,
) -> Response {
    let title = title_case(&request.title);
    let price = format_currency_label(&request.price);
    let sale_price = format_currency_label(&request.sale_price);
    let visibility = visibility_flags(&price, &sale_price);
    let discount = discount_percent(&price, &sale_price);
    let theme = Theme::parse(&request.theme);

    let logo_url = if request.logo_url.is_empty() {
        format!("{}/static/logo.svg", base_url(&state.config, &headers))
    } else {
        request.logo_url.clone()
    };

    // All four resolutions run concurrently; the render waits for the full
    // set (each one falls back on its own failure).
    let (primary_uri, secondary1_uri, secondary2_uri, logo_uri) = futures::join!(
        state.resolver.resolve(&request.product_image_primary),
        state.resolver.resolve(&request.product_image_secondary_1),
        state.resolver.resolve(&request.product_image_secondary_2),
        state.resolver.resolve(&logo_url),
    );

    let values = FrameValues {
        title,
        price,
        sale_price,
        primary_uri,
        secondary1_uri,
        secondary2_uri,
        logo_uri,
        visibility,
        discount_percent: discount,
        theme,
    };
    let html = state.template.render(&values);

    let viewport = Viewport::default();
    let png = match state.renderer.render(html, viewport.width, viewport.height).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("render failed, serving fallback: {}", e);
            transparent_png_bytes()
        }
    };

    (
        [(header::CONTENT_TYPE, "image/png"), (header::CACHE_CONTROL, NO_STORE)],
        png,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default)]
    v: String,
}

async fn feed_xml(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
) -> Response {
    let upstream = state
        .http
        .get(&state.config.feed_url)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await;

    let response = match upstream {
        Ok(r) => r,
        Err(e) => {
            error!("upstream feed fetch failed: {}", e);
            return (StatusCode::BAD_GATEWAY, format!("upstream feed fetch failed: {}", e)).into_response();
        }
    };
    if !response.status().is_success() {
        let status = response.status();
        error!("upstream feed returned status {}", status);
        return (StatusCode::BAD_GATEWAY, format!("upstream feed returned status {}", status)).into_response();
    }

    let body = match response.text().await {
        Ok(t) => t,
        Err(e) => {
            error!("upstream feed body read failed: {}", e);
            return (StatusCode::BAD_GATEWAY, format!("upstream feed body read failed: {}", e)).into_response();
        }
    };

    let options = FeedRewriteOptions {
        base_url: base_url(&state.config, &headers),
        feed_version: query.v.trim().to_string(),
    };
    let rewritten = rewrite_feed(&body, &options);
    info!("feed rewritten ({} bytes in, {} bytes out)", body.len(), rewritten.len());

    (
        [(header::CONTENT_TYPE, "application/xml"), (header::CACHE_CONTROL, NO_STORE)],
        rewritten,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ProbeQuery {
    url: String,
}

/// Operational diagnostics for image fetch failures: what does the remote
/// actually return when we ask like a browser?
async fn probe(State(state): State<Arc<AppState>>, Query(query): Query<ProbeQuery>) -> Response {
    let identity = &state.resolver_identity;
    let mut request = state
        .http
        .get(&query.url)
        .timeout(std::time::Duration::from_secs(20))
        .header(
            reqwest::header::USER_AGENT,
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome Safari",
        )
        .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
        .header(reqwest::header::ACCEPT_LANGUAGE, "tr-TR,tr;q=0.9,en;q=0.8");
    if !identity.referer.is_empty() {
        request = request.header(reqwest::header::REFERER, identity.referer.clone());
    }
    if !identity.origin.is_empty() {
        request = request.header(reqwest::header::ORIGIN, identity.origin.clone());
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return Json(json!({ "url": query.url, "error": e.to_string() })).into_response();
        }
    };

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return Json(json!({ "url": query.url, "error": e.to_string() })).into_response();
        }
    };

    let is_text = content_type.contains("text") || content_type.contains("html");
    let text_preview = if is_text {
        let text = String::from_utf8_lossy(&bytes);
        Some(text.chars().take(300).collect::<String>())
    } else {
        None
    };

    Json(json!({
        "url": query.url,
        "status_code": status,
        "content_type": content_type,
        "content_length": bytes.len(),
        "first_bytes_base64": STANDARD.encode(&bytes[..bytes.len().min(50)]),
        "text_preview": text_preview,
    }))
    .into_response()
}

async fn static_asset(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> Response {
    if !is_safe_asset_name(&file) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.config.asset_dir.join("static").join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, asset_content_type(&file))], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn is_safe_asset_name(file: &str) -> bool {
    !file.is_empty() && !file.contains("..") && !file.contains('/') && !file.contains('\\')
}

fn asset_content_type(file: &str) -> &'static str {
    let lower = file.to_lowercase();
    if lower.ends_with(".svg") {
        "image/svg+xml"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".css") {
        "text/css"
    } else {
        "application/octet-stream"
    }
}

/// Public base URL: the configured override, else derived from the request's
/// Host header (honoring a forwarded proto when present).
fn base_url(config: &Config, headers: &HeaderMap) -> String {
    if !config.base_url.is_empty() {
        return config.base_url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", proto, host)
}
