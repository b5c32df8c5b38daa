//! Drain the result stream into a presentation sink.

use crate::model::{CertificateFindings, Finding, HostResult, Outcome};
use crate::target::TargetDescriptor;
use anyhow::Result;
use tokio::sync::mpsc;

/// Receives results in host, then certificate, then finding order.
pub trait ReportSink {
    fn connection_error(&mut self, target: &TargetDescriptor, reason: &str) -> Result<()>;
    fn finding(&mut self, target: &TargetDescriptor, cert: &CertificateFindings, finding: &Finding) -> Result<()>;
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub hosts: usize,
    pub connection_errors: usize,
    pub certificates: usize,
    pub findings: usize,
}

impl ScanSummary {
    fn record(&mut self, result: &HostResult) {
        self.hosts += 1;
        match &result.outcome {
            Outcome::ConnectionError(_) => self.connection_errors += 1,
            Outcome::Findings(certs) => {
                self.certificates += certs.len();
                self.findings += certs.iter().map(|c| c.findings.len()).sum::<usize>();
            }
        }
    }
}

/// Hand one host result to the sink.
pub fn report_host<S: ReportSink + ?Sized>(result: &HostResult, sink: &mut S) -> Result<()> {
    match &result.outcome {
        Outcome::ConnectionError(reason) => sink.connection_error(&result.target, reason),
        Outcome::Findings(certs) => {
            for cert in certs {
                for finding in &cert.findings {
                    sink.finding(&result.target, cert, finding)?;
                }
            }
            Ok(())
        }
    }
}

/// Consume `results` until the stream closes, then finish the sink.
pub async fn aggregate<S: ReportSink + ?Sized>(
    mut results: mpsc::UnboundedReceiver<HostResult>,
    sink: &mut S,
) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();
    while let Some(result) = results.recv().await {
        summary.record(&result);
        report_host(&result, sink)?;
    }
    sink.finish()?;
    Ok(summary)
}
