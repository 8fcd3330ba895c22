//! Environment-level configuration.
//!
//! All knobs are plain key/value environment variables, matching how the
//! service is deployed on constrained container hosts. The resolver's
//! outbound request identity (Referer/Origin) is derived from the feed URL
//! so fetches look like they come from the shop's own pages.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::resolve::ResolverConfig;

const DEFAULT_FEED_URL: &str = "https://www.vatkali.com/Xml/?Type=FACEBOOK&fname=vatkali";

#[derive(Debug, Clone)]
pub struct Config {
    /// Public base URL override; when empty the per-request Host header is
    /// used instead.
    pub base_url: String,
    /// Upstream feed document to rewrite.
    pub feed_url: String,
    /// Render gate capacity.
    pub render_concurrency: usize,
    pub host: String,
    pub port: u16,
    /// Directory holding template.html, styles.css and the static assets.
    pub asset_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let feed_url = std::env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());

        let render_concurrency = match std::env::var("RENDER_CONCURRENCY") {
            Ok(v) => v
                .parse::<usize>()
                .map_err(|_| Error::Config(format!("RENDER_CONCURRENCY must be an integer, got {:?}", v)))?,
            Err(_) => 1,
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got {:?}", v)))?,
            Err(_) => 8000,
        };

        let asset_dir = PathBuf::from(std::env::var("ASSET_DIR").unwrap_or_else(|_| "assets".to_string()));

        Ok(Self { base_url, feed_url, render_concurrency, host, port, asset_dir })
    }

    /// Resolver identity derived from the upstream feed's origin.
    pub fn resolver_config(&self) -> ResolverConfig {
        let (referer, origin) = match Url::parse(&self.feed_url) {
            Ok(u) => {
                let origin = u.origin().ascii_serialization();
                (format!("{}/", origin), origin)
            }
            Err(_) => (String::new(), String::new()),
        };
        ResolverConfig {
            referer,
            origin,
            timeout: Duration::from_secs(20),
            ..ResolverConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_identity_from_feed_origin() {
        let config = Config {
            base_url: String::new(),
            feed_url: "https://shop.example.com/Xml/?Type=FACEBOOK".to_string(),
            render_concurrency: 1,
            host: "0.0.0.0".to_string(),
            port: 8000,
            asset_dir: PathBuf::from("assets"),
        };
        let rc = config.resolver_config();
        assert_eq!(rc.origin, "https://shop.example.com");
        assert_eq!(rc.referer, "https://shop.example.com/");
    }
}
