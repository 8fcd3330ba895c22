//! Image-URL canonicalization, deduplication and content signatures.
//!
//! Canonical forms are comparison keys only; the original URL text is what
//! ends up in feeds and render requests. Stripping the tracking parameters
//! lets the same image be recognized behind different campaign links.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use url::Url;

/// Number of hex characters in a content signature.
const SIGNATURE_LEN: usize = 12;

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_lowercase();
    k.starts_with("utm_") || k == "fbclid" || k == "gclid"
}

/// Strip tracking query parameters (`utm_*`, `fbclid`, `gclid`) and
/// re-serialize the URL with the remaining parameters in their original
/// relative order. Unparseable input is returned unchanged so it still
/// serves as its own comparison key. Idempotent.
pub fn canonicalize(u: &str) -> String {
    if u.is_empty() {
        return String::new();
    }
    let mut parsed = match Url::parse(u) {
        Ok(p) => p,
        Err(_) => return u.to_string(),
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    parsed.set_query(None);
    if !kept.is_empty() {
        let mut qp = parsed.query_pairs_mut();
        for (k, v) in &kept {
            qp.append_pair(k, v);
        }
    }
    parsed.to_string()
}

/// The up-to-three image URLs chosen for one product frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChosenImages {
    pub primary: String,
    pub secondary1: String,
    pub secondary2: String,
}

/// Deduplicate an ordered candidate list (primary first) by canonical key,
/// keeping the first occurrence with its original text, and pick up to three
/// images. Missing secondaries fall back to the nearest preceding choice, so
/// the result is only empty when the primary itself is absent.
pub fn choose_images(candidates: &[String]) -> ChosenImages {
    let mut seen = HashSet::new();
    let mut uniq: Vec<&str> = Vec::new();
    for raw in candidates {
        let u = raw.trim();
        if u.is_empty() {
            continue;
        }
        let key = canonicalize(u);
        if seen.insert(key) {
            uniq.push(u);
        }
    }

    let primary = uniq
        .first()
        .map(|u| u.to_string())
        .unwrap_or_else(|| candidates.first().map(|u| u.trim().to_string()).unwrap_or_default());

    let mut secondary1 = uniq.get(1).map(|u| u.to_string()).unwrap_or_default();
    if secondary1.is_empty() {
        secondary1 = primary.clone();
    }
    let mut secondary2 = uniq.get(2).map(|u| u.to_string()).unwrap_or_default();
    if secondary2.is_empty() {
        secondary2 = secondary1.clone();
    }

    ChosenImages { primary, secondary1, secondary2 }
}

/// Deterministic 12-hex-character fingerprint over an ordered field tuple.
/// Used for cache-busting on the consuming ad platform, not for integrity.
pub fn signature(parts: &[&str]) -> String {
    let joined = parts.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(SIGNATURE_LEN);
    hex
}
