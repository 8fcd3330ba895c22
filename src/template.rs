//! Frame template loading and placeholder substitution.
//!
//! The template is plain HTML with `{{...}}` tokens; the stylesheet is
//! spliced in the same way, so the document handed to the browser is fully
//! self-contained. Substitution stays string-based on purpose: the browser
//! is the layout engine, this module only fills in attribute values.

use std::path::Path;

use crate::error::{Error, Result};
use crate::text::PriceVisibility;
use crate::Theme;

/// Values substituted into one frame document. Image fields are data URIs
/// produced by the resolver; text fields are already normalized.
#[derive(Debug, Clone, Default)]
pub struct FrameValues {
    pub title: String,
    pub price: String,
    pub sale_price: String,
    pub primary_uri: String,
    pub secondary1_uri: String,
    pub secondary2_uri: String,
    pub logo_uri: String,
    pub visibility: PriceVisibility,
    pub discount_percent: Option<i32>,
    pub theme: Theme,
}

/// A loaded template/stylesheet pair.
#[derive(Debug, Clone)]
pub struct FrameTemplate {
    html: String,
    css: String,
}

impl FrameTemplate {
    /// Load `template.html` and `styles.css` from the asset directory.
    pub fn load(asset_dir: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(asset_dir.join("template.html"))
            .map_err(|e| Error::Config(format!("Failed to read template.html: {}", e)))?;
        let css = std::fs::read_to_string(asset_dir.join("styles.css"))
            .map_err(|e| Error::Config(format!("Failed to read styles.css: {}", e)))?;
        Ok(Self { html, css })
    }

    /// Build a template directly from strings; used by tests.
    pub fn from_parts(html: impl Into<String>, css: impl Into<String>) -> Self {
        Self { html: html.into(), css: css.into() }
    }

    /// Substitute all placeholders and return the final document.
    pub fn render(&self, values: &FrameValues) -> String {
        let discount_text = values
            .discount_percent
            .map(|pct| format!("%{} İNDİRİM", pct))
            .unwrap_or_default();
        let discount_hidden = values.discount_percent.is_none();

        self.html
            .replace("{{CSS}}", &self.css)
            .replace("{{theme}}", values.theme.as_str())
            .replace("{{product_image_primary}}", &values.primary_uri)
            .replace("{{product_image_secondary_1}}", &values.secondary1_uri)
            .replace("{{product_image_secondary_2}}", &values.secondary2_uri)
            .replace("{{logo_url}}", &values.logo_uri)
            .replace("{{title}}", &escape_html(&values.title))
            .replace("{{price}}", &escape_html(&values.price))
            .replace("{{sale_price}}", &escape_html(&values.sale_price))
            .replace("{{discount_text}}", &escape_html(&discount_text))
            .replace("{{old_hidden}}", hidden_attr(values.visibility.old_hidden))
            .replace("{{new_hidden}}", hidden_attr(values.visibility.new_hidden))
            .replace("{{single_hidden}}", hidden_attr(values.visibility.single_hidden))
            .replace("{{discount_hidden}}", hidden_attr(discount_hidden))
    }
}

fn hidden_attr(hidden: bool) -> &'static str {
    if hidden {
        "hidden"
    } else {
        ""
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
