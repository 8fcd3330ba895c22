//! Framecast
//!
//! A product-frame render service: turns structured product data (title,
//! prices, image URLs) into PNG "frame" images via a supervised headless
//! Chrome process, and rewrites a commerce product feed so every item's
//! image fields point at rendered frames.
//!
//! # Architecture
//!
//! - **Normalization** ([`text`], [`urls`]): pure helpers for Turkish-aware
//!   price/title formatting, tracking-parameter stripping, image dedup and
//!   content signatures.
//! - **Resolution** ([`resolve`]): remote images become inline data URIs,
//!   degrading to a transparent fallback instead of failing.
//! - **Rendering** ([`supervisor`], [`chrome`], [`gate`], [`renderer`]):
//!   one supervised browser process, a bounded concurrency gate, and a
//!   renderer that retries exactly once after a fatal browser loss.
//! - **Feed** ([`feed`]): streaming XML rewrite with deterministic,
//!   idempotent render URLs.
//! - **Surface** ([`server`], [`config`]): axum endpoints and environment
//!   configuration.

use serde::Deserialize;

pub mod error;
pub use error::{Error, Result};

pub mod chrome;
pub mod config;
pub mod feed;
pub mod gate;
pub mod renderer;
pub mod resolve;
pub mod server;
pub mod supervisor;
pub mod template;
pub mod text;
pub mod urls;

pub use renderer::FrameRenderer;
pub use supervisor::Supervisor;

/// Frame viewport dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1080, height: 1080 }
    }
}

/// Visual theme of a frame. Selected per feed item from its custom label;
/// anything unrecognized is the classic look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Classic,
    Season,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Classic => "classic",
            Theme::Season => "season",
        }
    }

    /// Parse a query-parameter value; unknown values fall back to classic.
    pub fn parse(s: &str) -> Theme {
        if s.eq_ignore_ascii_case("season") {
            Theme::Season
        } else {
            Theme::Classic
        }
    }
}

/// One inbound render request, bound from `/render.png` query parameters.
/// Constructed per request, consumed synchronously, then discarded.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RenderRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub product_image_primary: String,
    #[serde(default)]
    pub product_image_secondary_1: String,
    #[serde(default)]
    pub product_image_secondary_2: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub theme: String,
    /// Feed-version token; part of the signature, ignored at render time.
    #[serde(default)]
    pub fv: String,
    /// Content signature; cache-busting only, ignored at render time.
    #[serde(default)]
    pub v: String,
}
