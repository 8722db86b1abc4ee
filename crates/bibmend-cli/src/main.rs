use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio_util::sync::CancellationToken;

mod output;

use output::ColorMode;

/// Fix BibTeX entries using the CrossRef API: fill in missing fields,
/// correct garbled ones, and strip noise — conservatively.
#[derive(Parser, Debug)]
#[command(name = "bibmend", version, about, long_about = None)]
struct Cli {
    /// Input BibTeX file
    input: PathBuf,

    /// Output file (default: <input>_fixed.bib)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Contact e-mail sent to CrossRef (recommended; enables the polite pool)
    #[arg(short, long)]
    email: Option<String>,

    /// Number of parallel workers
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Minimum spacing between API requests, in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// Title similarity required to accept a match (0.0-1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Candidates requested per title search
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Extra fields to strip from corrected entries (repeatable)
    #[arg(long = "drop-field")]
    drop_fields: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Parse and list entries without querying the API
    #[arg(long)]
    dry_run: bool,
}

/// Worker counts above this risk tripping CrossRef's fair-use limits.
const MAX_WORKERS: usize = 20;

/// Resolve the effective config: CLI flags > env vars > config file > defaults.
fn resolve_config(cli: &Cli, file: &bibmend_core::config_file::ConfigFile) -> bibmend_core::Config {
    let defaults = bibmend_core::Config::default();

    let mailto = cli
        .email
        .clone()
        .or_else(|| std::env::var("CROSSREF_MAILTO").ok())
        .or_else(|| file.api.as_ref().and_then(|a| a.mailto.clone()));

    let num_workers = cli
        .threads
        .or_else(|| file.runtime.as_ref().and_then(|r| r.workers))
        .unwrap_or(defaults.num_workers);

    let rate_limit_ms = cli
        .rate_limit_ms
        .or_else(|| file.runtime.as_ref().and_then(|r| r.rate_limit_ms))
        .unwrap_or(defaults.rate_limit_ms);

    let accept_threshold = cli
        .threshold
        .or_else(|| file.matching.as_ref().and_then(|m| m.accept_threshold))
        .unwrap_or(defaults.accept_threshold);

    let journal_threshold = file
        .matching
        .as_ref()
        .and_then(|m| m.journal_threshold)
        .unwrap_or(defaults.journal_threshold);

    let max_candidates = cli
        .max_candidates
        .or_else(|| file.matching.as_ref().and_then(|m| m.max_candidates))
        .unwrap_or(defaults.max_candidates);

    let timeout_secs = cli
        .timeout_secs
        .or_else(|| file.runtime.as_ref().and_then(|r| r.timeout_secs))
        .unwrap_or(defaults.timeout_secs);

    let mut denylist = defaults.denylist.clone();
    if let Some(extra) = file.output.as_ref().and_then(|o| o.drop_fields.clone()) {
        denylist.extend(extra);
    }
    denylist.extend(cli.drop_fields.iter().cloned());
    denylist.sort();
    denylist.dedup();

    bibmend_core::Config {
        mailto,
        num_workers,
        rate_limit_ms,
        accept_threshold,
        journal_threshold,
        max_candidates,
        timeout_secs,
        denylist,
        pacer: Arc::new(bibmend_core::RequestPacer::from_millis(rate_limit_ms)),
    }
}

/// Clamp the worker count to a safe range, warning when it was lowered.
fn clamp_workers(requested: usize) -> usize {
    if requested > MAX_WORKERS {
        tracing::warn!(
            requested,
            clamped = MAX_WORKERS,
            "more workers risk API rate limits, clamping"
        );
        MAX_WORKERS
    } else {
        requested.max(1)
    }
}

/// Default output path: `refs.bib` → `refs_fixed.bib`.
fn default_output_path(input: &PathBuf) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "bibliography".to_string());
    input.with_file_name(format!("{stem}_fixed.bib"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !cli.input.exists() {
        anyhow::bail!("File not found: {}", cli.input.display());
    }

    let entries = bibmend_bib::parse_file(&cli.input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", cli.input.display(), e))?;

    let color = ColorMode(!cli.no_color);

    if cli.dry_run {
        output::print_dry_run(&mut std::io::stdout(), &entries, color)?;
        return Ok(());
    }

    let file_config = bibmend_core::config_file::load_config();
    let mut config = resolve_config(&cli, &file_config);
    config.num_workers = clamp_workers(config.num_workers);

    if config.mailto.is_none() {
        eprintln!("Note: no contact e-mail set (-e / CROSSREF_MAILTO); CrossRef may deprioritize requests.");
    }

    println!(
        "Checking {} entries against CrossRef ({} workers)...\n",
        entries.len(),
        config.num_workers
    );

    let progress_cb = {
        let writer: Arc<Mutex<std::io::Stdout>> = Arc::new(Mutex::new(std::io::stdout()));
        move |event: bibmend_core::ProgressEvent| {
            if let Ok(mut w) = writer.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = std::io::Write::flush(&mut *w);
            }
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let report = bibmend_core::fix_entries(entries, config, progress_cb, cancel).await;

    let output_path = cli.output.unwrap_or_else(|| default_output_path(&cli.input));
    let emitted: Vec<bibmend_core::Entry> = report
        .outcomes
        .iter()
        .map(|o| o.entry.clone())
        .collect();
    bibmend_bib::write_file(&output_path, &emitted)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", output_path.display(), e))?;

    println!();
    output::print_summary(&mut std::io::stdout(), &report, &output_path, color)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_leaves_sane_counts_alone() {
        assert_eq!(clamp_workers(6), 6);
        assert_eq!(clamp_workers(20), 20);
    }

    #[test]
    fn clamp_caps_and_floors() {
        assert_eq!(clamp_workers(64), MAX_WORKERS);
        assert_eq!(clamp_workers(0), 1);
    }

    #[test]
    fn default_output_appends_fixed() {
        assert_eq!(
            default_output_path(&PathBuf::from("refs.bib")),
            PathBuf::from("refs_fixed.bib")
        );
        assert_eq!(
            default_output_path(&PathBuf::from("/tmp/dir/main.bib")),
            PathBuf::from("/tmp/dir/main_fixed.bib")
        );
    }

    #[test]
    fn cli_flags_override_file_config() {
        let cli = Cli::parse_from([
            "bibmend",
            "refs.bib",
            "--threads",
            "3",
            "--threshold",
            "0.9",
            "--drop-field",
            "note",
        ]);
        let file = bibmend_core::config_file::ConfigFile {
            runtime: Some(bibmend_core::config_file::RuntimeConfig {
                workers: Some(12),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = resolve_config(&cli, &file);
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.accept_threshold, 0.9);
        assert!(config.denylist.iter().any(|f| f == "note"));
        assert!(config.denylist.iter().any(|f| f == "abstract"));
    }

    #[test]
    fn file_config_fills_gaps() {
        let cli = Cli::parse_from(["bibmend", "refs.bib"]);
        let file = bibmend_core::config_file::ConfigFile {
            runtime: Some(bibmend_core::config_file::RuntimeConfig {
                workers: Some(12),
                rate_limit_ms: Some(250),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = resolve_config(&cli, &file);
        assert_eq!(config.num_workers, 12);
        assert_eq!(config.rate_limit_ms, 250);
        // Defaults survive where nothing is set
        assert_eq!(config.max_candidates, 5);
    }
}
