use anyhow::{Context, Result, bail};
use log::LevelFilter;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::types::WindowUnit;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Admission limit and window
    #[serde(default)]
    pub gate: GateConfig,

    /// Where documents go and with which credential
    #[serde(default)]
    pub api: ApiConfig,

    /// Caller and send-worker thread counts
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub io: IOConfig,
}

// ---------------- General ----------------

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,
    /// Write logs to <out_dir>/log_files instead of stderr
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_to_file: false,
        }
    }
}

// ---------------- Gate ----------------

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Requests admitted per window (0 blocks everything)
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub window_unit: WindowUnit,
    /// Explicit window length; wins over `window_unit` when set
    #[serde(default)]
    pub window_ms: Option<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_unit: WindowUnit::default(),
            window_ms: None,
        }
    }
}

impl GateConfig {
    pub fn window(&self) -> Duration {
        match self.window_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.window_unit.duration(),
        }
    }
}

// ---------------- API ----------------

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token, attached verbatim
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the token; read when `token` is not set
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            token_file: None,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inline token first, then the token file (trailing newline stripped).
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(t) = &self.token {
            return Ok(t.clone());
        }
        match &self.token_file {
            Some(p) => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("reading token file {p}"))?;
                Ok(raw.trim_end_matches(['\r', '\n']).to_string())
            }
            None => bail!("api.token or api.token_file must be set"),
        }
    }
}

// ---------------- Scheduler ----------------

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Number of submitting threads (0 = auto = CPU count)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Number of send workers (0 = auto = CPU count)
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            io_threads: default_io_threads(),
        }
    }
}

// ---------------- IO ----------------

#[derive(Debug, Clone, Deserialize)]
pub struct IOConfig {
    /// JSON array or JSON Lines of documents
    #[serde(default = "default_documents_file")]
    pub documents_file: String,
    /// Output directory; created if missing
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default = "default_results_file_name")]
    pub results_file_name: String,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            documents_file: default_documents_file(),
            out_dir: default_out_dir(),
            results_file_name: default_results_file_name(),
        }
    }
}

// ---- defaults ----
fn default_log_level() -> LevelFilter { LevelFilter::Info }

fn default_limit() -> u32 { 10 }

fn default_endpoint() -> String { "https://ismp.crpt.ru/api/v3/lk/documents/create".into() }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_user_agent() -> String { concat!("regpush/", env!("CARGO_PKG_VERSION")).into() }

fn default_concurrency() -> usize { 0 } // 0 = auto
fn default_io_threads() -> usize { 0 }

fn default_documents_file() -> String { "in/documents.json".into() }
fn default_out_dir() -> String { "out".into() }
fn default_results_file_name() -> String { "results.jsonl".into() }

// ---- public API ----

pub fn read_config<P: AsRef<Path>>(p: P) -> Result<RootConfig> {
    let s = fs::read_to_string(&p)
        .with_context(|| format!("reading config file {}", p.as_ref().display()))?;
    parse_config(&s).with_context(|| format!("loading config {}", p.as_ref().display()))
}

pub fn parse_config(s: &str) -> Result<RootConfig> {
    let root: RootConfig = toml::from_str(s).context("parsing TOML config")?;
    if root.gate.window().is_zero() {
        bail!("gate.window_ms must be greater than zero");
    }
    if root.api.endpoint.trim().is_empty() {
        bail!("api.endpoint must not be empty");
    }
    if root.api.timeout_ms == 0 {
        bail!("api.timeout_ms must be greater than zero");
    }
    Ok(root)
}
