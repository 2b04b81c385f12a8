use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4820;
const DEFAULT_K_FACTOR: f64 = 32.0;
const DEFAULT_RATING: f64 = 1000.0;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_COOLDOWN_DAYS: u32 = 1;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST server port (default: 4820).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,arenad=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Elo update constant (default: 32.0).
    k_factor: Option<f64>,
    /// Starting rating for every reviewer (default: 1000.0).
    default_rating: Option<f64>,
    /// Seconds an open session may idle before the sweep expires it (default: 1800).
    session_idle_timeout_secs: Option<u64>,
    /// Pairing cooldown in calendar days — an annotator never sees the same
    /// (paper, pair) combination again within the window (default: 1;
    /// 0 disables the cooldown).
    pairing_cooldown_days: Option<u32>,
    /// Interval between background maintenance sweeps (default: 60).
    sweep_interval_secs: Option<u64>,
    /// Paper registry snapshot, JSONL (default: {data_dir}/papers.jsonl).
    papers_file: Option<PathBuf>,
    /// Reviewer registry snapshot, JSONL (default: {data_dir}/reviewers.jsonl).
    reviewers_file: Option<PathBuf>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── ArenaConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// "pretty" (default) | "json".
    pub log_format: String,
    /// Elo update constant. A single global knob — the vote corpus is small
    /// and a larger K converges faster on sparse data.
    pub k_factor: f64,
    /// Rating every reviewer starts replay from.
    pub default_rating: f64,
    pub session_idle_timeout_secs: u64,
    pub pairing_cooldown_days: u32,
    pub sweep_interval_secs: u64,
    pub papers_file: PathBuf,
    pub reviewers_file: PathBuf,
}

impl ArenaConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
        papers_file: Option<PathBuf>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("ARENAD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("ARENAD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let papers_file = papers_file
            .or(toml.papers_file)
            .unwrap_or_else(|| data_dir.join("papers.jsonl"));
        let reviewers_file = toml
            .reviewers_file
            .unwrap_or_else(|| data_dir.join("reviewers.jsonl"));

        Self {
            port,
            bind_address,
            log,
            log_format,
            k_factor: toml.k_factor.unwrap_or(DEFAULT_K_FACTOR),
            default_rating: toml.default_rating.unwrap_or(DEFAULT_RATING),
            session_idle_timeout_secs: toml
                .session_idle_timeout_secs
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            pairing_cooldown_days: toml.pairing_cooldown_days.unwrap_or(DEFAULT_COOLDOWN_DAYS),
            sweep_interval_secs: toml
                .sweep_interval_secs
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            papers_file,
            reviewers_file,
            data_dir,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("arenad");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("arenad");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("arenad");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("arenad");
        }
    }
    PathBuf::from(".arenad")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ArenaConfig::new(None, Some(dir.path().to_path_buf()), None, None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.k_factor, 32.0);
        assert_eq!(cfg.default_rating, 1000.0);
        assert_eq!(cfg.session_idle_timeout_secs, 1800);
        assert_eq!(cfg.pairing_cooldown_days, 1);
        assert_eq!(cfg.papers_file, dir.path().join("papers.jsonl"));
    }

    #[test]
    fn toml_overrides_defaults_but_not_cli() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 9000\nk_factor = 16.0\nlog = \"debug\"\n",
        )
        .unwrap();
        let cfg = ArenaConfig::new(
            Some(4821),
            Some(dir.path().to_path_buf()),
            None,
            None,
            None,
        );
        // CLI wins over TOML for port; TOML wins over defaults elsewhere.
        assert_eq!(cfg.port, 4821);
        assert_eq!(cfg.k_factor, 16.0);
        assert_eq!(cfg.log, "debug");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = \"oops").unwrap();
        let cfg = ArenaConfig::new(None, Some(dir.path().to_path_buf()), None, None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}
