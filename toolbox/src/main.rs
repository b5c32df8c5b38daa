use anyhow::{bail, Context, Result};
use certscan_core::aggregate::aggregate;
use certscan_core::{target, CancelSignal, Dispatcher, SunsetTable, TargetDescriptor};
use clap::{ArgAction, Parser};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use time::OffsetDateTime;
use tls_probe::TlsProbe;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod report;
mod serve;

use config::{ScanConfig, Settings};
use report::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "certscan", version, about = "Check TLS endpoints for expiring certificates and sunset signature algorithms")]
struct Cli {
    /// Targets as host:port; prefix with "i " to skip chain verification
    targets: Vec<String>,
    /// File with one target per line (comments with # and blanks ignored)
    #[arg(long, value_name = "FILE")]
    hosts: Option<PathBuf>,
    /// Warn if a certificate expires within this many years
    #[arg(long, allow_negative_numbers = true)]
    years: Option<i64>,
    /// Warn if a certificate expires within this many months
    #[arg(long, allow_negative_numbers = true)]
    months: Option<i64>,
    /// Warn if a certificate expires within this many days (30 if no window is given)
    #[arg(long, allow_negative_numbers = true)]
    days: Option<i64>,
    /// Check that non-root certificates use a signature algorithm that is not sunset
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    check_sig_alg: Option<bool>,
    /// Maximum number of hosts to check at once (default 8)
    #[arg(long, allow_negative_numbers = true)]
    concurrency: Option<i64>,
    /// Output format: text, csv or jsonl
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Write the report to this file (overwrites) instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// After the scan, serve the report file over HTTP on this address
    #[arg(long, value_name = "ADDR")]
    serve: Option<String>,
    /// Optional config file (YAML). If omitted, loads ./certscan.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn scan_overrides(&self) -> ScanConfig {
        ScanConfig {
            years: self.years,
            months: self.months,
            days: self.days,
            check_sig_alg: self.check_sig_alg,
            concurrency: self.concurrency,
            format: self.format.map(|f| format!("{f:?}")),
            out: self.out.clone(),
        }
    }

    /// Positional targets first, then the hosts file in file order.
    fn targets(&self) -> Result<Vec<TargetDescriptor>> {
        let mut out = target::parse_lines(&self.targets);
        if let Some(path) = &self.hosts {
            let s = std::fs::read_to_string(path).with_context(|| format!("reading hosts file {}", path.display()))?;
            out.extend(target::parse_lines(s.lines()));
        }
        Ok(out)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Serving needs a report file; `out` may come from the CLI or the config.
fn check_serve(serve: Option<&str>, settings: &Settings) -> Result<()> {
    if serve.is_some() && settings.out.is_none() {
        bail!("--serve requires a report file (--out or scan.out in the config)");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file_cfg = config::load_config(cli.config.as_deref())?.and_then(|c| c.scan).unwrap_or_default();
    let settings = cli.scan_overrides().overlay(file_cfg).resolve()?;
    check_serve(cli.serve.as_deref(), &settings)?;
    let targets = cli.targets()?;
    if targets.is_empty() {
        bail!("no hosts to check: pass host:port arguments or --hosts <file>");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(settings, targets, cli.serve))
}

async fn run(settings: Settings, targets: Vec<TargetDescriptor>, serve_addr: Option<String>) -> Result<()> {
    let scan_id = Uuid::now_v7();
    let started = Instant::now();
    let sunsets = SunsetTable::standard(OffsetDateTime::now_utc());
    let dispatcher = Dispatcher::new(TlsProbe::new()?, settings.policy.clone(), sunsets);

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, letting in-flight probes finish");
                cancel.cancel();
            }
        });
    }

    let writer: Box<dyn Write + Send> = match &settings.out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(path)
                .with_context(|| format!("creating report {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout()),
    };
    let mut sink = report::open_sink(settings.format, writer, scan_id)?;

    let p = &settings.policy;
    info!(
        %scan_id,
        hosts = targets.len(),
        concurrency = p.concurrency,
        years = p.warn_years,
        months = p.warn_months,
        days = p.warn_days,
        check_sig_alg = p.check_signature_algorithm,
        "scan started"
    );
    let results = dispatcher.scan(targets, cancel.clone());
    let summary = aggregate(results, sink.as_mut()).await?;
    drop(sink);
    info!(
        %scan_id,
        hosts = summary.hosts,
        errors = summary.connection_errors,
        certificates = summary.certificates,
        findings = summary.findings,
        duration_ms = started.elapsed().as_millis() as u64,
        cancelled = cancel.is_cancelled(),
        "scan finished"
    );

    if let (Some(addr), Some(path)) = (serve_addr, settings.out) {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let addr = tokio::net::lookup_host(&addr)
            .await
            .with_context(|| format!("resolving {addr}"))?
            .next()
            .with_context(|| format!("no address for {addr}"))?;
        let (_, server) = serve::bind_report(addr, path, settings.format.content_type(), cancel)?;
        server.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certscan_core::VerificationMode;

    #[test]
    fn cli_flags_become_overrides() {
        let cli = Cli::parse_from([
            "certscan", "--days", "-3", "--check-sig-alg", "false", "--format", "jsonl", "--concurrency", "0", "a:443",
        ]);
        let s = cli.scan_overrides().overlay(ScanConfig::default()).resolve().unwrap();
        assert_eq!(s.policy.warn_days, 30);
        assert!(!s.policy.check_signature_algorithm);
        assert_eq!(s.policy.concurrency, 8);
        assert_eq!(s.format, OutputFormat::Jsonl);
    }

    #[test]
    fn targets_from_args_and_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"# fleet\n\nb.example:443\ni self-signed.local:8443\n").unwrap();
        let path = f.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["certscan", "--hosts", path.as_str(), "a.example:443"]);
        let targets = cli.targets().unwrap();
        let addrs: Vec<_> = targets.iter().map(|t| t.address.as_str()).collect();
        assert_eq!(addrs, ["a.example:443", "b.example:443", "self-signed.local:8443"]);
        assert_eq!(targets[2].mode, VerificationMode::InsecureAccepted);
    }

    #[test]
    fn missing_hosts_file_is_an_error() {
        let cli = Cli::parse_from(["certscan", "--hosts", "/nonexistent/certscan-hosts.txt"]);
        assert!(cli.targets().is_err());
    }

    #[test]
    fn serve_requires_a_report_file() {
        let no_out = ScanConfig::default().resolve().unwrap();
        assert!(check_serve(Some("127.0.0.1:8080"), &no_out).is_err());
        assert!(check_serve(None, &no_out).is_ok());
        let from_config = ScanConfig { out: Some("results.csv".into()), ..ScanConfig::default() }.resolve().unwrap();
        assert!(check_serve(Some("127.0.0.1:8080"), &from_config).is_ok());
    }
}
