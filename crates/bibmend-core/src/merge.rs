//! Conservative field merging of an accepted candidate into an entry.

use crate::fields::{canonical, order_rank};
use crate::{Candidate, Entry};

/// Merge an accepted candidate into an entry, producing a new entry.
///
/// Rules:
/// - The candidate wins every field it carries; the citation key and
///   entry type always come from the original.
/// - Original fields the candidate lacks are retained unchanged.
/// - Denylisted fields are dropped regardless of source.
/// - Output ordering is fixed: the [`crate::fields::FIELD_ORDER`] prefix
///   first, then the rest alphabetically.
///
/// The transform is pure (the original is untouched) and idempotent:
/// merging the result against the same candidate changes nothing.
pub fn merge(entry: &Entry, candidate: &Candidate, denylist: &[String]) -> Entry {
    let denied = |name: &str| denylist.iter().any(|d| canonical(d) == name);

    let mut merged = Entry::new(entry.key.clone(), entry.entry_type.clone());
    for (name, value) in entry.fields() {
        if !denied(name) {
            merged.set(name, value);
        }
    }
    for (name, value) in candidate.bib_fields() {
        if !denied(&name) {
            merged.set(&name, value);
        }
    }

    let mut ordered = Entry::new(entry.key.clone(), entry.entry_type.clone());
    let mut names: Vec<String> = merged.fields().map(|(n, _)| n.to_string()).collect();
    names.sort_by(|a, b| order_rank(a).cmp(&order_rank(b)).then_with(|| a.cmp(b)));
    for name in names {
        if let Some(value) = merged.get(&name) {
            ordered.set(&name, value.to_string());
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::DEFAULT_DENYLIST;

    fn denylist() -> Vec<String> {
        DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
    }

    fn smith_entry() -> Entry {
        let mut e = Entry::new("smith2020", "article");
        e.set("title", "machine learning applications");
        e.set("author", "Smith, John");
        e.set("abstract", "A very long abstract that should vanish.");
        e.set("keywords", "ml, applications");
        e
    }

    fn full_candidate() -> Candidate {
        Candidate {
            entry_type: "article".into(),
            title: Some("Machine Learning Applications".into()),
            authors: vec!["Smith, John".into(), "Doe, Jane".into()],
            container: Some("Journal of Testing".into()),
            year: Some("2020".into()),
            volume: Some("4".into()),
            number: Some("2".into()),
            pages: Some("101--120".into()),
            doi: Some("10.1000/jot.2020.101".into()),
            ..Candidate::default()
        }
    }

    #[test]
    fn candidate_wins_present_fields() {
        let merged = merge(&smith_entry(), &full_candidate(), &denylist());
        assert_eq!(merged.get("title"), Some("Machine Learning Applications"));
        assert_eq!(merged.get("author"), Some("Smith, John and Doe, Jane"));
        assert_eq!(merged.get("journal"), Some("Journal of Testing"));
        assert_eq!(merged.get("year"), Some("2020"));
        assert_eq!(merged.get("doi"), Some("10.1000/jot.2020.101"));
    }

    #[test]
    fn key_and_type_invariant() {
        let mut entry = smith_entry();
        entry.entry_type = "inproceedings".to_string();
        let mut candidate = full_candidate();
        candidate.entry_type = "article".to_string();

        let merged = merge(&entry, &candidate, &denylist());
        assert_eq!(merged.key, "smith2020");
        assert_eq!(merged.entry_type, "inproceedings");
    }

    #[test]
    fn original_fields_absent_from_candidate_retained() {
        let mut entry = smith_entry();
        entry.set("note", "Read for journal club");
        let mut candidate = full_candidate();
        candidate.pages = None;
        entry.set("pages", "99--100");

        let merged = merge(&entry, &candidate, &denylist());
        assert_eq!(merged.get("note"), Some("Read for journal club"));
        assert_eq!(merged.get("pages"), Some("99--100"));
    }

    #[test]
    fn denylist_dropped_from_both_sides() {
        // Present on the original
        let merged = merge(&smith_entry(), &full_candidate(), &denylist());
        assert_eq!(merged.get("abstract"), None);
        assert_eq!(merged.get("keywords"), None);

        // Extra configured denylist entries also apply
        let mut deny = denylist();
        deny.push("note".to_string());
        let mut entry = smith_entry();
        entry.set("note", "drop me");
        let merged = merge(&entry, &full_candidate(), &deny);
        assert_eq!(merged.get("note"), None);
    }

    #[test]
    fn output_ordering_fixed_prefix_then_alphabetical() {
        let mut entry = smith_entry();
        entry.set("url", "https://example.org/paper");
        entry.set("issn", "1234-5678");
        let merged = merge(&entry, &full_candidate(), &denylist());

        let names: Vec<&str> = merged.fields().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "title", "journal", "year", "author", "volume", "number", "pages", "doi",
                // tail is alphabetical
                "issn", "url",
            ]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let entry = smith_entry();
        let candidate = full_candidate();
        let deny = denylist();

        let once = merge(&entry, &candidate, &deny);
        let twice = merge(&once, &candidate, &deny);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_does_not_mutate_original() {
        let entry = smith_entry();
        let before = entry.clone();
        let _ = merge(&entry, &full_candidate(), &denylist());
        assert_eq!(entry, before);
    }

    #[test]
    fn populates_missing_bibliographic_fields() {
        // Entry with no journal field, candidate carries everything
        let mut entry = Entry::new("smith2020", "article");
        entry.set("title", "machine learning applications");
        entry.set("author", "Smith, John");

        let merged = merge(&entry, &full_candidate(), &denylist());
        assert_eq!(merged.key, "smith2020");
        assert!(merged.has_field("title"));
        assert!(merged.has_field("journal"));
        assert!(merged.has_field("year"));
        assert!(merged.has_field("author"));
        assert!(merged.has_field("doi"));
        assert_eq!(merged.get("abstract"), None);
        assert_eq!(merged.get("keywords"), None);
    }
}
