//! CrossRef works API client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use super::{MetadataSource, SearchQuery};
use crate::fields::{clean_title, normalize_pages};
use crate::rate_limit::parse_retry_after;
use crate::{Candidate, FetchError};

const API_BASE: &str = "https://api.crossref.org/works";

/// BibTeX month macros, indexed by month number - 1.
const MONTH_MACROS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub struct CrossRef {
    mailto: Option<String>,
}

impl CrossRef {
    pub fn new(mailto: Option<String>) -> Self {
        Self { mailto }
    }

    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("bibmend/0.2 (mailto:{email})"),
            None => "bibmend/0.2".to_string(),
        }
    }

    /// Map a non-2xx response to a [`FetchError`], extracting Retry-After
    /// on 429.
    fn classify_status(resp: &reqwest::Response) -> Result<(), FetchError> {
        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(FetchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {status}")));
        }
        Ok(())
    }
}

impl MetadataSource for CrossRef {
    fn name(&self) -> &str {
        "CrossRef"
    }

    fn lookup_doi<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Candidate>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{API_BASE}/{}", urlencoding::encode(doi));

            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if resp.status().as_u16() == 404 {
                return Ok(None);
            }
            Self::classify_status(&resp)?;

            let data: Value = resp
                .json()
                .await
                .map_err(|e| FetchError::Parse(e.to_string()))?;

            Ok(Some(item_to_candidate(&data["message"])))
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candidate>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let mut url = format!(
                "{API_BASE}?query.title={}&rows={}&sort=relevance",
                urlencoding::encode(&query.title),
                query.rows
            );
            if !query.authors.is_empty() {
                let authors = query.authors.join(" ");
                url.push_str(&format!("&query.author={}", urlencoding::encode(&authors)));
            }
            if let Some(ref email) = self.mailto {
                url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
            }

            let resp = client
                .get(&url)
                .header("User-Agent", self.user_agent())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            Self::classify_status(&resp)?;

            let data: Value = resp
                .json()
                .await
                .map_err(|e| FetchError::Parse(e.to_string()))?;

            let items = data["message"]["items"]
                .as_array()
                .cloned()
                .unwrap_or_default();

            Ok(items.iter().map(item_to_candidate).collect())
        })
    }
}

/// Convert one CrossRef work item to a normalized [`Candidate`].
pub fn item_to_candidate(item: &Value) -> Candidate {
    let mut candidate = Candidate {
        entry_type: map_entry_type(item["type"].as_str().unwrap_or("")),
        ..Candidate::default()
    };

    candidate.title = item["title"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .map(clean_title)
        .filter(|t| !t.is_empty());

    candidate.authors = item["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| {
                    if let Some(family) = a["family"].as_str() {
                        match a["given"].as_str().filter(|g| !g.is_empty()) {
                            Some(given) => Some(format!("{family}, {given}")),
                            None => Some(family.to_string()),
                        }
                    } else {
                        a["literal"].as_str().map(String::from)
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    candidate.container = item["container-title"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .map(clean_title)
        .filter(|c| !c.is_empty());

    // Date fields in order of preference
    for date_field in ["published-print", "published-online", "created", "issued"] {
        let parts = &item[date_field]["date-parts"][0];
        if let Some(parts) = parts.as_array()
            && !parts.is_empty()
        {
            if let Some(year) = parts.first().and_then(|v| v.as_i64()) {
                candidate.year = Some(year.to_string());
            }
            if let Some(month) = parts.get(1).and_then(|v| v.as_i64())
                && (1..=12).contains(&month)
            {
                candidate.month = Some(MONTH_MACROS[(month - 1) as usize].to_string());
            }
            if candidate.year.is_some() {
                break;
            }
        }
    }

    candidate.volume = scalar_string(&item["volume"]);

    // Issue number may be top-level or nested under journal-issue
    candidate.number = scalar_string(&item["issue"])
        .or_else(|| scalar_string(&item["journal-issue"]["issue"]));

    // Some journals use article numbers instead of page ranges
    candidate.pages = item["page"]
        .as_str()
        .map(normalize_pages)
        .filter(|p| !p.is_empty())
        .or_else(|| item["article-number"].as_str().map(String::from));

    candidate.doi = item["DOI"].as_str().map(String::from);
    candidate.publisher = item["publisher"].as_str().map(String::from);
    candidate.isbn = first_of(&item["ISBN"]);
    candidate.issn = first_of(&item["ISSN"]);
    candidate.url = item["URL"].as_str().map(String::from);

    candidate
}

/// CrossRef work type → BibTeX entry type.
fn map_entry_type(work_type: &str) -> String {
    match work_type {
        "book" | "monograph" => "book",
        "book-chapter" | "book-section" => "inbook",
        "proceedings-article" => "inproceedings",
        _ => "article",
    }
    .to_string()
}

/// A JSON string or number as a trimmed string.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First element of a string array, or the string itself.
fn first_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(arr) => arr.first().and_then(|v| v.as_str()).map(String::from),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_journal_article() {
        let item = json!({
            "type": "journal-article",
            "title": ["Machine learning  applications."],
            "author": [
                {"family": "Smith", "given": "John"},
                {"family": "Doe"}
            ],
            "container-title": ["Nature Methods"],
            "published-print": {"date-parts": [[2020, 3]]},
            "volume": "17",
            "issue": "3",
            "page": "261-272",
            "DOI": "10.1038/s41592-020-0772-5",
            "publisher": "Springer Nature",
            "ISSN": ["1548-7091", "1548-7105"],
            "URL": "https://doi.org/10.1038/s41592-020-0772-5"
        });

        let c = item_to_candidate(&item);
        assert_eq!(c.entry_type, "article");
        assert_eq!(c.title.as_deref(), Some("Machine learning applications"));
        assert_eq!(c.authors, vec!["Smith, John", "Doe"]);
        assert_eq!(c.container.as_deref(), Some("Nature Methods"));
        assert_eq!(c.year.as_deref(), Some("2020"));
        assert_eq!(c.month.as_deref(), Some("mar"));
        assert_eq!(c.volume.as_deref(), Some("17"));
        assert_eq!(c.number.as_deref(), Some("3"));
        assert_eq!(c.pages.as_deref(), Some("261--272"));
        assert_eq!(c.doi.as_deref(), Some("10.1038/s41592-020-0772-5"));
        assert_eq!(c.issn.as_deref(), Some("1548-7091"));
    }

    #[test]
    fn proceedings_container_becomes_booktitle() {
        let item = json!({
            "type": "proceedings-article",
            "title": ["Attention is all you need"],
            "container-title": ["Advances in Neural Information Processing Systems"]
        });

        let c = item_to_candidate(&item);
        assert_eq!(c.entry_type, "inproceedings");
        assert!(c.container_is_booktitle());
        let fields = c.bib_fields();
        assert!(fields.iter().any(|(n, _)| n == "booktitle"));
        assert!(!fields.iter().any(|(n, _)| n == "journal"));
    }

    #[test]
    fn nested_journal_issue() {
        let item = json!({
            "type": "journal-article",
            "title": ["Some paper"],
            "journal-issue": {"issue": "7"}
        });
        assert_eq!(item_to_candidate(&item).number.as_deref(), Some("7"));
    }

    #[test]
    fn article_number_fallback_for_pages() {
        let item = json!({
            "type": "journal-article",
            "title": ["Some paper"],
            "article-number": "e1017"
        });
        assert_eq!(item_to_candidate(&item).pages.as_deref(), Some("e1017"));
    }

    #[test]
    fn date_field_preference_order() {
        let item = json!({
            "type": "journal-article",
            "title": ["Some paper"],
            "created": {"date-parts": [[2019, 12]]},
            "published-print": {"date-parts": [[2021]]}
        });
        let c = item_to_candidate(&item);
        // published-print wins even without a month
        assert_eq!(c.year.as_deref(), Some("2021"));
        assert_eq!(c.month, None);
    }

    #[test]
    fn literal_author_names_kept() {
        let item = json!({
            "type": "journal-article",
            "title": ["Some report"],
            "author": [{"literal": "The ATLAS Collaboration"}]
        });
        assert_eq!(
            item_to_candidate(&item).authors,
            vec!["The ATLAS Collaboration"]
        );
    }

    #[test]
    fn empty_item_yields_default_article() {
        let c = item_to_candidate(&json!({}));
        assert_eq!(c.entry_type, "article");
        assert_eq!(c.title, None);
        assert!(c.authors.is_empty());
    }

    #[test]
    fn numeric_volume_stringified() {
        let item = json!({
            "type": "journal-article",
            "title": ["Some paper"],
            "volume": 12
        });
        assert_eq!(item_to_candidate(&item).volume.as_deref(), Some("12"));
    }
}
