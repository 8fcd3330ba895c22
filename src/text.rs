//! Price and title normalization helpers.
//!
//! All functions here are pure and locale-aware for Turkish text: the
//! dotted/dotless "i" pairs are mapped explicitly instead of relying on
//! ASCII case folding, and money strings accept both `2.390,00` and
//! `2,390.00` separator conventions.

/// Collapse internal whitespace runs to single spaces and trim. Idempotent.
pub fn normalize_price(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a price string and rewrite the currency code "TRY"
/// (case-insensitive) to the local label "TL". Everything else is untouched.
pub fn format_currency_label(s: &str) -> String {
    replace_ignore_ascii_case(&normalize_price(s), "TRY", "TL")
}

fn replace_ignore_ascii_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let lower = haystack.to_ascii_lowercase();
    let needle_lower = needle.to_ascii_lowercase();
    let mut rest = 0;
    let mut search = 0;
    while let Some(pos) = lower[search..].find(&needle_lower) {
        let at = search + pos;
        out.push_str(&haystack[rest..at]);
        out.push_str(replacement);
        rest = at + needle.len();
        search = rest;
    }
    out.push_str(&haystack[rest..]);
    out
}

/// Capitalize the first letter of each whitespace-delimited token with
/// Turkish i/ı handling: a leading "i" becomes "İ", a leading "ı" becomes
/// "I", and any "I"/"İ" in the remainder maps to "ı"/"i" before lowercasing.
/// Whitespace runs between tokens are preserved verbatim.
pub fn title_case(s: &str) -> String {
    let text = s.trim();
    if text.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !word.is_empty() {
                cap_word(&word, &mut out);
                word.clear();
            }
            out.push(ch);
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        cap_word(&word, &mut out);
    }
    out
}

fn cap_word(word: &str, out: &mut String) {
    let mut chars = word.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return,
    };

    match first {
        'i' => out.push('İ'),
        'ı' => out.push('I'),
        _ => out.extend(first.to_uppercase()),
    }

    for c in chars {
        match c {
            'I' => out.push('ı'),
            'İ' => out.push('i'),
            _ => out.extend(c.to_lowercase()),
        }
    }
}

/// Parse a money string such as `"₺2,390.00"`, `"2.390,00 TL"` or
/// `"2390 TL"` into a float. The rightmost of "," and "." is treated as the
/// decimal separator; the other one, if present, is discarded as a thousands
/// separator. A lone "," is a decimal separator.
pub fn parse_money(s: &str) -> Option<f64> {
    let t: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    if t.is_empty() {
        return None;
    }

    let comma = t.rfind(',');
    let dot = t.rfind('.');
    let cleaned = match (comma, dot) {
        (Some(c), Some(d)) => {
            if c > d {
                t.replace('.', "").replace(',', ".")
            } else {
                t.replace(',', "")
            }
        }
        (Some(_), None) => t.replace(',', "."),
        _ => t,
    };

    cleaned.parse::<f64>().ok()
}

/// Discount percentage from a regular and a sale price, rounded to the
/// nearest integer. `None` unless both parse, the regular price is positive,
/// the sale price is below it, and the rounded result is positive.
pub fn discount_percent(price: &str, sale: &str) -> Option<i32> {
    let p = parse_money(price)?;
    let s = parse_money(sale)?;
    if p <= 0.0 || s >= p {
        return None;
    }
    let pct = ((1.0 - s / p) * 100.0).round() as i32;
    if pct <= 0 {
        None
    } else {
        Some(pct)
    }
}

/// Which price regions of the frame are hidden. Exactly one of the dual
/// (old + new) and single regions is visible for any input pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceVisibility {
    pub old_hidden: bool,
    pub new_hidden: bool,
    pub single_hidden: bool,
}

impl Default for PriceVisibility {
    /// Single-price presentation: the dual region is hidden.
    fn default() -> Self {
        PriceVisibility { old_hidden: true, new_hidden: true, single_hidden: false }
    }
}

/// Compute visibility flags from normalized price strings: without a sale
/// price (or when it equals the regular price) only the single-price region
/// shows; otherwise the old/new pair shows.
pub fn visibility_flags(price: &str, sale: &str) -> PriceVisibility {
    let p = normalize_price(price);
    let s = normalize_price(sale);
    if s.is_empty() || s == p {
        PriceVisibility { old_hidden: true, new_hidden: true, single_hidden: false }
    } else {
        PriceVisibility { old_hidden: false, new_hidden: false, single_hidden: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_price_collapses_whitespace() {
        assert_eq!(normalize_price("  1.299,90\t TL \n"), "1.299,90 TL");
        assert_eq!(normalize_price(""), "");
        // Idempotent
        let once = normalize_price(" a  b ");
        assert_eq!(normalize_price(&once), once);
    }

    #[test]
    fn test_format_currency_label() {
        assert_eq!(format_currency_label("1299.90 TRY"), "1299.90 TL");
        assert_eq!(format_currency_label("1299.90 try"), "1299.90 TL");
        assert_eq!(format_currency_label("1299.90 Try"), "1299.90 TL");
        assert_eq!(format_currency_label("1299.90 USD"), "1299.90 USD");
        assert_eq!(format_currency_label(""), "");
    }

    #[test]
    fn test_title_case_turkish() {
        assert_eq!(title_case("istanbul ılgın"), "İstanbul Ilgın");
        assert_eq!(title_case("SİYAH TİŞÖRT"), "Siyah Tişört");
        assert_eq!(title_case("IRMAK"), "Irmak");
    }

    #[test]
    fn test_title_case_preserves_whitespace_runs() {
        assert_eq!(title_case("kadın   ceket"), "Kadın   Ceket");
    }

    #[test]
    fn test_parse_money_separator_resolution() {
        assert_eq!(parse_money("2.390,00 TL"), Some(2390.00));
        assert_eq!(parse_money("2,390.00"), Some(2390.00));
        assert_eq!(parse_money("2390"), Some(2390.0));
        assert_eq!(parse_money("₺149,90"), Some(149.90));
        assert_eq!(parse_money("TL"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn test_discount_percent() {
        assert_eq!(discount_percent("1000 TL", "750 TL"), Some(25));
        assert_eq!(discount_percent("1000 TL", "1000 TL"), None);
        assert_eq!(discount_percent("", "500"), None);
        assert_eq!(discount_percent("1000", "1001"), None);
        // Tiny discounts that round to zero are suppressed
        assert_eq!(discount_percent("1000", "999"), None);
    }

    #[test]
    fn test_visibility_flags_exclusive() {
        let cases = [("1000", "750"), ("1000", "1000"), ("1000", ""), ("", ""), ("", "500")];
        for (p, s) in cases {
            let v = visibility_flags(p, s);
            let dual_visible = !v.old_hidden && !v.new_hidden;
            let single_visible = !v.single_hidden;
            assert!(
                dual_visible != single_visible,
                "exactly one region must be visible for {:?}",
                (p, s)
            );
        }
    }

    #[test]
    fn test_visibility_flags_values() {
        let dual = visibility_flags("1.000 TL", "750 TL");
        assert_eq!(
            dual,
            PriceVisibility { old_hidden: false, new_hidden: false, single_hidden: true }
        );

        let single = visibility_flags("1.000  TL", "1.000 TL");
        assert_eq!(
            single,
            PriceVisibility { old_hidden: true, new_hidden: true, single_hidden: false }
        );
    }
}
