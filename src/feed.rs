//! Commerce feed rewriting.
//!
//! Streams the upstream product feed (Google `g:` namespace) and rewrites
//! every item's image fields into render-endpoint URLs carrying a content
//! signature. Everything else in the document is copied through verbatim.
//! The transformation is additive and optional: a document without a
//! recognizable channel, or one that fails to parse, passes through
//! unchanged rather than failing the endpoint.

use std::io::Write;

use log::warn;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::text::{format_currency_label, title_case};
use crate::urls::{choose_images, signature, ChosenImages};
use crate::Theme;

/// Parameters for one feed rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct FeedRewriteOptions {
    /// Public base URL of this service, without a trailing slash.
    pub base_url: String,
    /// External feed-version token (`?v=` on the feed endpoint), folded
    /// into every signature for coordinated cache-busting.
    pub feed_version: String,
}

/// Label content selecting the seasonal theme, after folding.
const SEASON_TOKEN: &str = "yeni sezon";

/// Rewrite a feed document. Returns the rewritten XML, or the input
/// unchanged when there is no channel element or the document does not
/// parse.
pub fn rewrite_feed(xml: &str, opts: &FeedRewriteOptions) -> String {
    if !has_channel(xml) {
        return xml.to_string();
    }
    match try_rewrite(xml, opts) {
        Ok(out) => out,
        Err(e) => {
            warn!("feed rewrite failed, passing document through: {}", e);
            xml.to_string()
        }
    }
}

fn has_channel(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"channel" {
                    return true;
                }
            }
            Ok(Event::Eof) => return false,
            Err(_) => return false,
            _ => {}
        }
    }
}

fn try_rewrite(xml: &str, opts: &FeedRewriteOptions) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event().map_err(|e| Error::Feed(e.to_string()))? {
            Event::Start(e) if e.local_name().as_ref() == b"item" => {
                let start = e.into_owned();
                let inner = buffer_item(&mut reader)?;
                write_item(&mut writer, &start, &inner, opts)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"item" => {
                // Degenerate empty item: still gets synthesized image fields.
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let start = BytesStart::new(name.clone());
                write_event(&mut writer, Event::Start(start))?;
                append_image_elements(&mut writer, &render_url(&ItemFields::default(), opts), None, None)?;
                write_event(&mut writer, Event::End(BytesEnd::new(name)))?;
            }
            Event::Eof => break,
            ev => write_event(&mut writer, ev)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| Error::Feed(e.to_string()))
}

/// Collect every event inside one `<item>` up to (but excluding) its
/// closing tag.
fn buffer_item(reader: &mut Reader<&[u8]>) -> Result<Vec<Event<'static>>> {
    let mut events = Vec::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(|e| Error::Feed(e.to_string()))? {
            Event::Start(e) => {
                depth += 1;
                events.push(Event::Start(e.into_owned()));
            }
            Event::End(e) => {
                if depth == 0 {
                    return Ok(events);
                }
                depth -= 1;
                events.push(Event::End(e.into_owned()));
            }
            Event::Eof => return Err(Error::Feed("unexpected end of document inside item".to_string())),
            ev => events.push(ev.into_owned()),
        }
    }
}

#[derive(Debug, Default)]
struct ItemFields {
    title: String,
    price: String,
    sale_price: String,
    label: String,
    /// Primary image first, then the additional images in document order.
    candidates: Vec<String>,
    /// Qualified names observed on the original image elements, reused for
    /// the rewritten ones.
    image_name: Option<String>,
    additional_name: Option<String>,
}

fn collect_fields(inner: &[Event<'_>]) -> ItemFields {
    let mut fields = ItemFields::default();
    let mut primary = String::new();
    let mut additional: Vec<String> = Vec::new();

    let mut depth = 0usize;
    let mut current: Option<(Vec<u8>, String)> = None; // (local name, qualified name)
    let mut text = String::new();

    for ev in inner {
        match ev {
            Event::Start(e) => {
                if depth == 0 {
                    current = Some((
                        e.local_name().as_ref().to_vec(),
                        String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    ));
                    text.clear();
                }
                depth += 1;
            }
            Event::Text(t) => {
                if current.is_some() {
                    if let Ok(piece) = t.unescape() {
                        text.push_str(&piece);
                    }
                }
            }
            Event::CData(c) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((local, qualified)) = current.take() {
                        let value = text.trim().to_string();
                        match local.as_slice() {
                            b"title" => fields.title = value,
                            b"price" => fields.price = value,
                            b"sale_price" => fields.sale_price = value,
                            b"custom_label_0" => fields.label = value,
                            b"image_link" => {
                                primary = value;
                                fields.image_name = Some(qualified);
                            }
                            b"additional_image_link" => {
                                if !value.is_empty() {
                                    additional.push(value);
                                }
                                fields.additional_name = Some(qualified);
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fields.candidates.push(primary);
    fields.candidates.extend(additional);
    fields
}

/// Theme from the free-form label: fold Unicode hyphen variants, NBSP and
/// the Turkish dotted/dotless i to ASCII, lowercase, then look for the
/// season token. The explicit İ/ı mapping avoids the combining-dot form
/// that standard lowercasing produces.
pub fn theme_from_label(label: &str) -> Theme {
    let folded: String = label
        .chars()
        .map(|c| match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' => '-',
            '\u{00A0}' => ' ',
            'İ' | 'ı' => 'i',
            _ => c,
        })
        .collect();
    if folded.to_lowercase().contains(SEASON_TOKEN) {
        Theme::Season
    } else {
        Theme::Classic
    }
}

fn render_url(fields: &ItemFields, opts: &FeedRewriteOptions) -> String {
    let title = title_case(&fields.title);
    let price = format_currency_label(&fields.price);
    let sale = format_currency_label(&fields.sale_price);
    let chosen = choose_images(&fields.candidates);
    let theme = theme_from_label(&fields.label);

    let sig = signature(&[
        &title,
        &price,
        &sale,
        &chosen.primary,
        &chosen.secondary1,
        &chosen.secondary2,
        &opts.feed_version,
        theme.as_str(),
    ]);

    build_render_url(&opts.base_url, &title, &price, &sale, &chosen, &opts.feed_version, theme, &sig)
}

fn build_render_url(
    base_url: &str,
    title: &str,
    price: &str,
    sale: &str,
    images: &ChosenImages,
    feed_version: &str,
    theme: Theme,
    sig: &str,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("title", title)
        .append_pair("price", price)
        .append_pair("sale_price", sale)
        .append_pair("product_image_primary", &images.primary)
        .append_pair("product_image_secondary_1", &images.secondary1)
        .append_pair("product_image_secondary_2", &images.secondary2)
        .append_pair("theme", theme.as_str())
        .append_pair("fv", feed_version)
        .append_pair("v", sig);
    format!("{}/render.png?{}", base_url, query.finish())
}

fn write_item<W: Write>(
    writer: &mut Writer<W>,
    start: &BytesStart<'static>,
    inner: &[Event<'static>],
    opts: &FeedRewriteOptions,
) -> Result<()> {
    let fields = collect_fields(inner);
    let url = render_url(&fields, opts);

    write_event(writer, Event::Start(start.clone()))?;

    // Copy everything except the original image elements.
    let mut depth = 0usize;
    let mut skipping = false;
    for ev in inner {
        match ev {
            Event::Start(e) => {
                if depth == 0 && is_image_element(e) {
                    skipping = true;
                }
                depth += 1;
                if !skipping {
                    write_event(writer, Event::Start(e.clone()))?;
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if skipping {
                    if depth == 0 {
                        skipping = false;
                    }
                } else {
                    write_event(writer, Event::End(e.clone()))?;
                }
            }
            Event::Empty(e) => {
                if !(depth == 0 && is_image_element(e)) && !skipping {
                    write_event(writer, Event::Empty(e.clone()))?;
                }
            }
            ev => {
                if !skipping {
                    write_event(writer, ev.clone())?;
                }
            }
        }
    }

    append_image_elements(writer, &url, fields.image_name.as_deref(), fields.additional_name.as_deref())?;

    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn is_image_element(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"image_link" | b"additional_image_link")
}

/// Write the rewritten primary image element and exactly two secondary ones,
/// all pointing at the same render URL so any crawler slot reaches an
/// equivalent rendered asset.
fn append_image_elements<W: Write>(
    writer: &mut Writer<W>,
    url: &str,
    image_name: Option<&str>,
    additional_name: Option<&str>,
) -> Result<()> {
    let image_name = image_name.unwrap_or("g:image_link").to_string();
    let additional_name = additional_name.unwrap_or("g:additional_image_link").to_string();

    write_text_element(writer, &image_name, url)?;
    for _ in 0..2 {
        write_text_element(writer, &additional_name, url)?;
    }
    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn write_event<W: Write>(writer: &mut Writer<W>, ev: Event<'_>) -> Result<()> {
    writer.write_event(ev).map_err(|e| Error::Feed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "xmlns:g=\"http://base.google.com/ns/1.0\"";

    fn opts() -> FeedRewriteOptions {
        FeedRewriteOptions {
            base_url: "https://frames.example.com".to_string(),
            feed_version: "fv1".to_string(),
        }
    }

    fn feed_with_items(items: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><rss {}><channel><title>Shop</title>{}</channel></rss>",
            NS, items
        )
    }

    fn query_param(url: &str, key: &str) -> Option<String> {
        let (_, qs) = url.split_once('?')?;
        form_urlencoded::parse(qs.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Pull the text of every image element out of the rewritten document.
    fn image_texts(xml: &str, local: &[u8]) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut out = Vec::new();
        let mut grab = false;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => grab = e.local_name().as_ref() == local,
                Event::Text(t) => {
                    if grab {
                        out.push(t.unescape().unwrap().into_owned());
                    }
                }
                Event::End(_) => grab = false,
                Event::Eof => break,
                _ => {}
            }
        }
        out
    }

    #[test]
    fn test_item_without_secondaries_reuses_primary() {
        let xml = feed_with_items(
            "<item><title>keten ceket</title>\
             <g:price>1000 TRY</g:price><g:sale_price>750 TRY</g:sale_price>\
             <g:image_link>https://cdn.x/a.jpg</g:image_link></item>",
        );
        let out = rewrite_feed(&xml, &opts());

        let images = image_texts(&out, b"image_link");
        assert_eq!(images.len(), 1);
        let url = &images[0];
        assert!(url.starts_with("https://frames.example.com/render.png?"));
        assert_eq!(query_param(url, "product_image_primary").unwrap(), "https://cdn.x/a.jpg");
        assert_eq!(query_param(url, "product_image_secondary_1").unwrap(), "https://cdn.x/a.jpg");
        assert_eq!(query_param(url, "product_image_secondary_2").unwrap(), "https://cdn.x/a.jpg");
        assert_eq!(query_param(url, "price").unwrap(), "1000 TL");
        assert_eq!(query_param(url, "title").unwrap(), "Keten Ceket");
        assert_eq!(query_param(url, "fv").unwrap(), "fv1");
        assert_eq!(query_param(url, "v").unwrap().len(), 12);

        // Exactly two secondary slots, both the same render URL
        let additional = image_texts(&out, b"additional_image_link");
        assert_eq!(additional.len(), 2);
        assert_eq!(&additional[0], url);
        assert_eq!(&additional[1], url);
    }

    #[test]
    fn test_tracking_decorated_urls_stay_distinct() {
        let xml = feed_with_items(
            "<item><title>x</title>\
             <g:image_link>https://cdn.x/a.jpg?utm_source=fb</g:image_link>\
             <g:additional_image_link>https://cdn.x/b.jpg?fbclid=1</g:additional_image_link>\
             <g:additional_image_link>https://cdn.x/c.jpg?gclid=2</g:additional_image_link></item>",
        );
        let out = rewrite_feed(&xml, &opts());
        let url = &image_texts(&out, b"image_link")[0];

        let p = query_param(url, "product_image_primary").unwrap();
        let s1 = query_param(url, "product_image_secondary_1").unwrap();
        let s2 = query_param(url, "product_image_secondary_2").unwrap();
        assert_eq!(p, "https://cdn.x/a.jpg?utm_source=fb");
        assert_eq!(s1, "https://cdn.x/b.jpg?fbclid=1");
        assert_eq!(s2, "https://cdn.x/c.jpg?gclid=2");
        assert_ne!(p, s1);
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_duplicate_behind_tracking_params_collapses() {
        let xml = feed_with_items(
            "<item><g:image_link>https://cdn.x/a.jpg</g:image_link>\
             <g:additional_image_link>https://cdn.x/a.jpg?utm_campaign=retarget</g:additional_image_link>\
             <g:additional_image_link>https://cdn.x/b.jpg</g:additional_image_link></item>",
        );
        let out = rewrite_feed(&xml, &opts());
        let url = &image_texts(&out, b"image_link")[0];

        assert_eq!(query_param(url, "product_image_secondary_1").unwrap(), "https://cdn.x/b.jpg");
        // Only two distinct images: secondary-2 falls back to secondary-1
        assert_eq!(query_param(url, "product_image_secondary_2").unwrap(), "https://cdn.x/b.jpg");
    }

    #[test]
    fn test_missing_image_link_is_synthesized() {
        let xml = feed_with_items("<item><title>no image</title></item>");
        let out = rewrite_feed(&xml, &opts());

        let images = image_texts(&out, b"image_link");
        assert_eq!(images.len(), 1);
        assert!(images[0].contains("/render.png?"));
        assert_eq!(image_texts(&out, b"additional_image_link").len(), 2);
    }

    #[test]
    fn test_other_fields_and_document_preserved() {
        let xml = feed_with_items(
            "<item><title>x</title><g:id>SKU-1</g:id><link>https://shop.x/p/1</link>\
             <g:image_link>https://cdn.x/a.jpg</g:image_link></item>",
        );
        let out = rewrite_feed(&xml, &opts());
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(out.contains("<g:id>SKU-1</g:id>"));
        assert!(out.contains("<link>https://shop.x/p/1</link>"));
        assert!(out.contains("<title>x</title>"));
        assert!(out.contains("<title>Shop</title>"));
        // Original image URL only survives inside the render URL query
        assert!(!out.contains(">https://cdn.x/a.jpg<"));
    }

    #[test]
    fn test_missing_channel_passthrough() {
        let xml = "<?xml version=\"1.0\"?><rss><weird/></rss>";
        assert_eq!(rewrite_feed(xml, &opts()), xml);
    }

    #[test]
    fn test_malformed_document_passthrough() {
        let xml = "<rss><channel><item><title>broken";
        assert_eq!(rewrite_feed(xml, &opts()), xml);
    }

    #[test]
    fn test_theme_from_label() {
        assert_eq!(theme_from_label("Yeni Sezon"), Theme::Season);
        assert_eq!(theme_from_label("YENİ SEZON 2025"), Theme::Season);
        assert_eq!(theme_from_label("yeni\u{00A0}sezon"), Theme::Season);
        assert_eq!(theme_from_label("yeni\u{2013}sezon"), Theme::Classic);
        assert_eq!(theme_from_label("indirim"), Theme::Classic);
        assert_eq!(theme_from_label(""), Theme::Classic);
    }

    #[test]
    fn test_theme_changes_signature() {
        let classic = feed_with_items(
            "<item><title>x</title><g:image_link>https://cdn.x/a.jpg</g:image_link></item>",
        );
        let seasonal = feed_with_items(
            "<item><title>x</title><g:image_link>https://cdn.x/a.jpg</g:image_link>\
             <g:custom_label_0>yeni sezon</g:custom_label_0></item>",
        );
        let sig_a = query_param(&image_texts(&rewrite_feed(&classic, &opts()), b"image_link")[0], "v").unwrap();
        let sig_b = query_param(&image_texts(&rewrite_feed(&seasonal, &opts()), b"image_link")[0], "v").unwrap();
        assert_ne!(sig_a, sig_b);
    }
}
