use std::io::Write;
use std::path::Path;

use bibmend_core::{Disposition, Entry, FixReport, ProgressEvent};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn short_title(entry: &Entry) -> String {
    let title = entry.get("title").unwrap_or("(no title)");
    if title.len() > 50 {
        format!("{}...", &title[..50])
    } else {
        title.to_string()
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Checking { index, total, key } => {
            writeln!(w, "[{}/{}] Checking {}", index + 1, total, key)?;
        }
        ProgressEvent::Result {
            index,
            total,
            outcome,
        } => {
            let idx = index + 1;
            let key = &outcome.entry.key;
            match &outcome.disposition {
                Disposition::Matched { score, via } => {
                    if color.enabled() {
                        writeln!(
                            w,
                            "[{}/{}] {} -> {} ({:.2}, {})",
                            idx,
                            total,
                            key,
                            "FIXED".green(),
                            score,
                            via
                        )?;
                    } else {
                        writeln!(w, "[{}/{}] {} -> FIXED ({:.2}, {})", idx, total, key, score, via)?;
                    }
                }
                Disposition::Unmatched => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] {} -> {}", idx, total, key, "NO MATCH".yellow())?;
                    } else {
                        writeln!(w, "[{}/{}] {} -> NO MATCH", idx, total, key)?;
                    }
                }
                Disposition::Errored { reason } => {
                    if color.enabled() {
                        writeln!(
                            w,
                            "[{}/{}] {} -> {} ({})",
                            idx,
                            total,
                            key,
                            "ERROR".red(),
                            reason
                        )?;
                    } else {
                        writeln!(w, "[{}/{}] {} -> ERROR ({})", idx, total, key, reason)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Print the final run summary.
pub fn print_summary(
    w: &mut dyn Write,
    report: &FixReport,
    output_path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let stats = &report.stats;

    if color.enabled() {
        writeln!(
            w,
            "Done: {} fixed, {} unmatched, {} errored (of {})",
            stats.matched.green(),
            stats.unmatched.yellow(),
            stats.errored.red(),
            stats.total
        )?;
    } else {
        writeln!(
            w,
            "Done: {} fixed, {} unmatched, {} errored (of {})",
            stats.matched, stats.unmatched, stats.errored, stats.total
        )?;
    }

    // Unmatched and errored entries are emitted unchanged; list the
    // errored ones so nothing fails silently.
    let errored: Vec<(&str, &str)> = report
        .outcomes
        .iter()
        .filter_map(|o| match &o.disposition {
            Disposition::Errored { reason } => Some((o.entry.key.as_str(), reason.as_str())),
            _ => None,
        })
        .collect();
    if !errored.is_empty() {
        writeln!(w)?;
        writeln!(w, "Entries kept as-is after errors:")?;
        for (key, reason) in errored {
            writeln!(w, "  {key}: {reason}")?;
        }
    }

    writeln!(w, "Wrote {}", output_path.display())?;
    Ok(())
}

/// List parsed entries without touching the network.
pub fn print_dry_run(
    w: &mut dyn Write,
    entries: &[Entry],
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} entries parsed\n",
            "DRY RUN:".bold().cyan(),
            entries.len()
        )?;
    } else {
        writeln!(w, "DRY RUN: {} entries parsed\n", entries.len())?;
    }

    for (i, entry) in entries.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{}", format!("[{}] {}", i + 1, entry.key).bold().yellow())?;
        } else {
            writeln!(w, "[{}] {}", i + 1, entry.key)?;
        }
        writeln!(w, "  Type:    {}", entry.entry_type)?;
        writeln!(w, "  Title:   {}", short_title(entry))?;
        if let Some(author) = entry.get("author") {
            writeln!(w, "  Authors: {author}")?;
        }
        if let Some(doi) = entry.get("doi") {
            writeln!(w, "  DOI:     {doi}")?;
        }
        writeln!(w)?;
    }

    writeln!(w, "Total: {} entries", entries.len())?;
    Ok(())
}
