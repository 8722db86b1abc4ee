//! Canonical field names, output ordering, and value cleaning.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fields stripped from every merged entry regardless of source.
pub const DEFAULT_DENYLIST: [&str; 2] = ["abstract", "keywords"];

/// Leading field order for merged entries. Fields not listed here follow
/// in alphabetical order.
pub const FIELD_ORDER: [&str; 9] = [
    "title",
    "journal",
    "booktitle",
    "year",
    "author",
    "volume",
    "number",
    "pages",
    "doi",
];

/// Canonical form of a field name: trimmed, lowercase.
pub fn canonical(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Position of a field in the fixed output ordering, for sorting.
/// Unlisted fields sort after all listed ones, alphabetically.
pub fn order_rank(name: &str) -> usize {
    FIELD_ORDER
        .iter()
        .position(|f| *f == name)
        .unwrap_or(FIELD_ORDER.len())
}

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static REPEAT_PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}|,{2,}|;{2,}").unwrap());
static PAGE_DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\u{2212}\u{2013}\u{2014}]+").unwrap());

/// Clean a title or container string coming from either the input file or
/// the API: strip markup tags, unescape common HTML entities, collapse
/// whitespace, trim trailing periods and wrapping quotes.
pub fn clean_title(title: &str) -> String {
    let title = HTML_TAG_RE.replace_all(title, "");

    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    let title = WS_RE.replace_all(title.trim(), " ");
    let title = REPEAT_PUNCT_RE.replace_all(&title, |caps: &regex::Captures| {
        caps[0][..1].to_string()
    });
    let title = title.trim_end_matches('.').trim();

    // Drop quotes only when they wrap the whole string
    let title = if (title.starts_with('"') && title.ends_with('"') && title.len() >= 2)
        || (title.starts_with('\'') && title.ends_with('\'') && title.len() >= 2)
    {
        &title[1..title.len() - 1]
    } else {
        title
    };

    title.trim().to_string()
}

/// Normalize a page range to the BibTeX `--` convention. Handles hyphens,
/// en/em dashes, and the unicode minus sign.
pub fn normalize_pages(pages: &str) -> String {
    PAGE_DASH_RE.replace_all(pages.trim(), "--").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_lowercases_and_trims() {
        assert_eq!(canonical(" Title "), "title");
        assert_eq!(canonical("AUTHOR"), "author");
    }

    #[test]
    fn clean_title_strips_html() {
        assert_eq!(
            clean_title("The <i>Drosophila</i> genome"),
            "The Drosophila genome"
        );
    }

    #[test]
    fn clean_title_unescapes_entities() {
        assert_eq!(clean_title("Salt &amp; light"), "Salt & light");
        assert_eq!(clean_title("a &lt; b"), "a < b");
    }

    #[test]
    fn clean_title_collapses_whitespace_and_trailing_period() {
        assert_eq!(clean_title("  Deep   learning. "), "Deep learning");
    }

    #[test]
    fn clean_title_removes_wrapping_quotes() {
        assert_eq!(clean_title("\"Attention is all you need\""), "Attention is all you need");
        // Interior quotes are kept
        assert_eq!(clean_title("The \"best\" model"), "The \"best\" model");
    }

    #[test]
    fn clean_title_squashes_repeated_punctuation() {
        assert_eq!(clean_title("Results,, methods.."), "Results, methods");
    }

    #[test]
    fn pages_dashes_normalized() {
        assert_eq!(normalize_pages("123-456"), "123--456");
        assert_eq!(normalize_pages("123\u{2013}456"), "123--456");
        assert_eq!(normalize_pages("e1017"), "e1017");
    }

    #[test]
    fn order_rank_listed_before_unlisted() {
        assert!(order_rank("title") < order_rank("publisher"));
        assert!(order_rank("doi") < order_rank("issn"));
        assert_eq!(order_rank("publisher"), order_rank("issn"));
    }
}
