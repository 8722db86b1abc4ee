use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub matching: Option<MatchingConfig>,
    pub runtime: Option<RuntimeConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Contact e-mail sent with every request (polite-pool routing).
    pub mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub accept_threshold: Option<f64>,
    pub journal_threshold: Option<f64>,
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub workers: Option<usize>,
    pub rate_limit_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Fields stripped from merged entries, in addition to the defaults.
    pub drop_fields: Option<Vec<String>>,
}

/// Platform config directory path: `<config_dir>/bibmend/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bibmend").join("config.toml"))
}

/// Load config by cascading CWD `.bibmend.toml` over the platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".bibmend.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            mailto: overlay
                .api
                .as_ref()
                .and_then(|a| a.mailto.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.mailto.clone())),
        }),
        matching: Some(MatchingConfig {
            accept_threshold: overlay
                .matching
                .as_ref()
                .and_then(|m| m.accept_threshold)
                .or_else(|| base.matching.as_ref().and_then(|m| m.accept_threshold)),
            journal_threshold: overlay
                .matching
                .as_ref()
                .and_then(|m| m.journal_threshold)
                .or_else(|| base.matching.as_ref().and_then(|m| m.journal_threshold)),
            max_candidates: overlay
                .matching
                .as_ref()
                .and_then(|m| m.max_candidates)
                .or_else(|| base.matching.as_ref().and_then(|m| m.max_candidates)),
        }),
        runtime: Some(RuntimeConfig {
            workers: overlay
                .runtime
                .as_ref()
                .and_then(|r| r.workers)
                .or_else(|| base.runtime.as_ref().and_then(|r| r.workers)),
            rate_limit_ms: overlay
                .runtime
                .as_ref()
                .and_then(|r| r.rate_limit_ms)
                .or_else(|| base.runtime.as_ref().and_then(|r| r.rate_limit_ms)),
            timeout_secs: overlay
                .runtime
                .as_ref()
                .and_then(|r| r.timeout_secs)
                .or_else(|| base.runtime.as_ref().and_then(|r| r.timeout_secs)),
        }),
        output: Some(OutputConfig {
            drop_fields: overlay
                .output
                .as_ref()
                .and_then(|o| o.drop_fields.clone())
                .or_else(|| base.output.as_ref().and_then(|o| o.drop_fields.clone())),
        }),
    }
}
