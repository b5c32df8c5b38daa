use crate::report::OutputFormat;
use anyhow::{anyhow, Context, Result};
use certscan_core::WarningPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "certscan.yaml";

/// Scan options as written in the config file or given on the command line.
/// Unset fields fall through to the next layer.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct ScanConfig {
    pub years: Option<i64>,
    pub months: Option<i64>,
    pub days: Option<i64>,
    pub check_sig_alg: Option<bool>,
    pub concurrency: Option<i64>,
    pub format: Option<String>,
    pub out: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanConfig>,
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub policy: WarningPolicy,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
}

impl ScanConfig {
    /// Fields set in `self` win, the rest come from `fallback`.
    pub fn overlay(self, fallback: ScanConfig) -> ScanConfig {
        ScanConfig {
            years: self.years.or(fallback.years),
            months: self.months.or(fallback.months),
            days: self.days.or(fallback.days),
            check_sig_alg: self.check_sig_alg.or(fallback.check_sig_alg),
            concurrency: self.concurrency.or(fallback.concurrency),
            format: self.format.or(fallback.format),
            out: self.out.or(fallback.out),
        }
    }

    pub fn resolve(self) -> Result<Settings> {
        let policy = WarningPolicy::resolve(
            self.years.unwrap_or(0),
            self.months.unwrap_or(0),
            self.days.unwrap_or(0),
            self.check_sig_alg.unwrap_or(true),
            self.concurrency.unwrap_or(certscan_core::policy::DEFAULT_CONCURRENCY as i64),
        );
        let format = match self.format.as_deref() {
            None => OutputFormat::Text,
            Some(f) => OutputFormat::parse(f).ok_or_else(|| anyhow!("unknown output format {f:?} (text, csv, jsonl)"))?,
        };
        Ok(Settings { policy, format, out: self.out })
    }
}

/// Load the config file. An explicit path must exist; the default
/// `./certscan.yaml` is optional.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(cfg))
}
