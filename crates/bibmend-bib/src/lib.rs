//! BibTeX parsing and serialization for bibmend.
//!
//! Parsing is delegated to `biblatex`; a salvage pass recovers individual
//! entries from files the whole-file parser rejects. Serialization writes
//! the conventional two-space indent with aligned `=` signs.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use bibmend_core::Entry;

#[derive(Error, Debug)]
pub enum BibError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no BibTeX entries found")]
    NoEntries,
}

/// Parse a `.bib` file into entries, input order preserved.
pub fn parse_file(path: &Path) -> Result<Vec<Entry>, BibError> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse `.bib` content from a string.
///
/// Tries the whole file first; on failure, splits at `@` entry boundaries
/// and parses each chunk independently. Real .bib files often carry minor
/// syntax errors (stray braces, raw text between entries) that should not
/// take down every other entry with them.
pub fn parse_str(content: &str) -> Result<Vec<Entry>, BibError> {
    let entries = match biblatex::Bibliography::parse(content) {
        Ok(bibliography) => bibliography.iter().map(convert_entry).collect(),
        Err(err) => {
            tracing::debug!(error = %err, "whole-file parse failed, salvaging per entry");
            parse_entries_individually(content)
        }
    };

    let entries = dedup_keys(entries);
    if entries.is_empty() {
        return Err(BibError::NoEntries);
    }
    Ok(entries)
}

/// Split content at entry boundaries and parse each chunk on its own,
/// keeping whatever parses.
fn parse_entries_individually(content: &str) -> Vec<Entry> {
    static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^@[a-zA-Z]").unwrap());

    let positions: Vec<usize> = ENTRY_RE.find_iter(content).map(|m| m.start()).collect();

    let mut entries = Vec::new();
    for (i, &start) in positions.iter().enumerate() {
        let end = positions.get(i + 1).copied().unwrap_or(content.len());
        let chunk = &content[start..end];

        match biblatex::Bibliography::parse(chunk) {
            Ok(bib) => entries.extend(bib.iter().map(convert_entry)),
            Err(err) => {
                tracing::warn!(error = %err, "dropping unparsable entry chunk");
            }
        }
    }
    entries
}

/// Enforce key uniqueness: first occurrence wins, later duplicates are
/// dropped with a warning.
fn dedup_keys(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            let fresh = seen.insert(entry.key.clone());
            if !fresh {
                tracing::warn!(key = %entry.key, "duplicate citation key, keeping first occurrence");
            }
            fresh
        })
        .collect()
}

/// Convert a parsed biblatex entry to the core model.
fn convert_entry(entry: &biblatex::Entry) -> Entry {
    let mut out = Entry::new(
        entry.key.clone(),
        entry.entry_type.to_string().to_lowercase(),
    );
    for (name, chunks) in entry.fields.iter() {
        let value = chunks_to_string(chunks);
        if !value.trim().is_empty() {
            out.set(name, value);
        }
    }
    out
}

/// Convert biblatex chunks to a plain string.
fn chunks_to_string(chunks: &[biblatex::Spanned<biblatex::Chunk>]) -> String {
    chunks
        .iter()
        .map(|c| match &c.v {
            biblatex::Chunk::Normal(s) => s.as_str(),
            biblatex::Chunk::Verbatim(s) => s.as_str(),
            biblatex::Chunk::Math(s) => s.as_str(),
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Serialize entries back to BibTeX text.
///
/// Two-space indent, `=` aligned to the widest field name per entry,
/// brace-delimited values, one blank line between entries.
pub fn serialize(entries: &[Entry]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        serialize_entry(entry, &mut out);
    }
    out
}

fn serialize_entry(entry: &Entry, out: &mut String) {
    let width = entry
        .fields()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);

    out.push_str(&format!("@{}{{{},\n", entry.entry_type, entry.key));
    let field_count = entry.fields().count();
    for (i, (name, value)) in entry.fields().enumerate() {
        out.push_str(&format!("  {name:<width$} = {{{value}}}"));
        if i + 1 < field_count {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("}\n");
}

/// Write entries to a file.
pub fn write_file(path: &Path, entries: &[Entry]) -> Result<(), BibError> {
    std::fs::write(path, serialize(entries))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_BIB: &str = r#"
@article{smith2020,
  title = {Machine learning applications},
  author = {Smith, John},
  year = {2020},
  journal = {Journal of Testing}
}

@inproceedings{doe2019attention,
  title = {Attention for everyone},
  author = {Doe, Jane and Roe, Richard},
  booktitle = {Proceedings of Nowhere},
  year = {2019}
}
"#;

    #[test]
    fn parses_entries_with_fields() {
        let entries = parse_str(SIMPLE_BIB).unwrap();
        assert_eq!(entries.len(), 2);

        let smith = &entries[0];
        assert_eq!(smith.key, "smith2020");
        assert_eq!(smith.entry_type, "article");
        assert_eq!(smith.get("title"), Some("Machine learning applications"));
        assert_eq!(smith.get("journal"), Some("Journal of Testing"));

        let doe = &entries[1];
        assert_eq!(doe.entry_type, "inproceedings");
        assert_eq!(doe.get("booktitle"), Some("Proceedings of Nowhere"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(parse_str(""), Err(BibError::NoEntries)));
        assert!(matches!(
            parse_str("% just a comment\n"),
            Err(BibError::NoEntries)
        ));
    }

    #[test]
    fn salvages_around_malformed_entry() {
        let content = r#"
@article{good1,
  title = {First good paper},
  year = {2020}
}

@article{broken,
  title = {Unclosed brace

@article{good2,
  title = {Second good paper},
  year = {2021}
}
"#;
        let entries = parse_str(content).unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert!(keys.contains(&"good1"));
        assert!(keys.contains(&"good2"));
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let content = r#"
@article{dup,
  title = {First version},
  year = {2020}
}

@article{dup,
  title = {Second version},
  year = {2021}
}
"#;
        let entries = parse_str(content).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get("title"), Some("First version"));
    }

    #[test]
    fn serializer_layout() {
        let mut entry = Entry::new("smith2020", "article");
        entry.set("title", "Machine learning applications");
        entry.set("year", "2020");

        let text = serialize(&[entry]);
        assert_eq!(
            text,
            "@article{smith2020,\n  title = {Machine learning applications},\n  year  = {2020}\n}\n"
        );
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let entries = parse_str(SIMPLE_BIB).unwrap();
        let text = serialize(&entries);
        let reparsed = parse_str(&text).unwrap();

        assert_eq!(entries.len(), reparsed.len());
        for (a, b) in entries.iter().zip(&reparsed) {
            assert_eq!(a.key, b.key);
            assert_eq!(a.entry_type, b.entry_type);
            for (name, value) in a.fields() {
                assert_eq!(b.get(name), Some(value), "field {name} of {}", a.key);
            }
        }
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.bib");

        let entries = parse_str(SIMPLE_BIB).unwrap();
        write_file(&path, &entries).unwrap();
        let reread = parse_file(&path).unwrap();

        assert_eq!(reread.len(), entries.len());
        assert_eq!(reread[0].key, "smith2020");
    }
}
