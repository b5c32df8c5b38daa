//! Finding renderers: text lines, CSV rows, JSON lines.

use anyhow::Result;
use certscan_core::aggregate::ReportSink;
use certscan_core::model::serial_hex;
use certscan_core::{CertificateFindings, Finding, TargetDescriptor, VerificationMode};
use clap::ValueEnum;
use std::io::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat { Text, Csv, Jsonl }

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "jsonl" => Some(Self::Jsonl),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Text | Self::Jsonl => "text/plain",
        }
    }
}

pub const CSV_HEADER: [&str; 7] = ["host", "common_name", "serial", "fingerprint_sha256", "finding", "value", "detail"];

pub fn open_sink<W: Write + Send + 'static>(format: OutputFormat, out: W, scan_id: Uuid) -> Result<Box<dyn ReportSink + Send>> {
    Ok(match format {
        OutputFormat::Text => Box::new(TextReport { out }),
        OutputFormat::Csv => Box::new(CsvReport::new(out)?),
        OutputFormat::Jsonl => Box::new(JsonlReport { out, scan_id }),
    })
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

fn finding_kind(finding: &Finding) -> &'static str {
    match finding {
        Finding::ExpiringShortly { .. } => "expiring_shortly",
        Finding::ExpiringSoon { .. } => "expiring_soon",
        Finding::SunsetAlgorithm { .. } => "sunset_algorithm",
    }
}

/// Human readable line for one finding.
pub fn finding_line(host: &str, cert: &CertificateFindings, finding: &Finding) -> String {
    let cn = &cert.common_name;
    let serial = serial_hex(&cert.serial_number);
    match finding {
        Finding::ExpiringShortly { hours_remaining } => {
            format!("{host}: ** '{cn}' (S/N {serial}) expires in {hours_remaining} hours! **")
        }
        Finding::ExpiringSoon { days_remaining } => {
            format!("{host}: '{cn}' (S/N {serial}) expires in roughly {days_remaining} days.")
        }
        Finding::SunsetAlgorithm { algorithm_name, .. } => format!(
            "{host}: '{cn}' (S/N {serial}) expires after the sunset date for its signature algorithm '{algorithm_name}'."
        ),
    }
}

pub struct TextReport<W> {
    out: W,
}

impl<W: Write> ReportSink for TextReport<W> {
    fn connection_error(&mut self, target: &TargetDescriptor, reason: &str) -> Result<()> {
        writeln!(self.out, "{}: {}", target.address, reason)?;
        Ok(())
    }

    fn finding(&mut self, target: &TargetDescriptor, cert: &CertificateFindings, finding: &Finding) -> Result<()> {
        writeln!(self.out, "{}", finding_line(&target.address, cert, finding))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub struct CsvReport<W: Write> {
    wtr: csv::Writer<W>,
}

impl<W: Write> CsvReport<W> {
    pub fn new(out: W) -> Result<Self> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(CSV_HEADER)?;
        Ok(CsvReport { wtr })
    }
}

impl<W: Write> ReportSink for CsvReport<W> {
    fn connection_error(&mut self, target: &TargetDescriptor, reason: &str) -> Result<()> {
        self.wtr.write_record([target.address.as_str(), "", "", "", "connection_error", "", reason])?;
        Ok(())
    }

    fn finding(&mut self, target: &TargetDescriptor, cert: &CertificateFindings, finding: &Finding) -> Result<()> {
        let (value, detail) = match finding {
            Finding::ExpiringShortly { hours_remaining } => (hours_remaining.to_string(), "hours".to_string()),
            Finding::ExpiringSoon { days_remaining } => (days_remaining.to_string(), "days".to_string()),
            Finding::SunsetAlgorithm { algorithm_name, sunset_date } => (algorithm_name.clone(), rfc3339(*sunset_date)),
        };
        self.wtr.write_record([
            target.address.as_str(),
            cert.common_name.as_str(),
            serial_hex(&cert.serial_number).as_str(),
            cert.fingerprint.as_str(),
            finding_kind(finding),
            value.as_str(),
            detail.as_str(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }
}

pub struct JsonlReport<W> {
    out: W,
    scan_id: Uuid,
}

fn mode_str(mode: VerificationMode) -> &'static str {
    match mode {
        VerificationMode::Verified => "verified",
        VerificationMode::InsecureAccepted => "insecure",
    }
}

impl<W: Write> ReportSink for JsonlReport<W> {
    fn connection_error(&mut self, target: &TargetDescriptor, reason: &str) -> Result<()> {
        let obj = serde_json::json!({
            "scan_id": self.scan_id.to_string(),
            "host": target.address,
            "mode": mode_str(target.mode),
            "error": reason,
        });
        writeln!(self.out, "{}", serde_json::to_string(&obj)?)?;
        Ok(())
    }

    fn finding(&mut self, target: &TargetDescriptor, cert: &CertificateFindings, finding: &Finding) -> Result<()> {
        let mut obj = serde_json::json!({
            "scan_id": self.scan_id.to_string(),
            "host": target.address,
            "mode": mode_str(target.mode),
            "common_name": cert.common_name,
            "serial": serial_hex(&cert.serial_number),
            "fingerprint_sha256": cert.fingerprint,
            "finding": finding_kind(finding),
        });
        match finding {
            Finding::ExpiringShortly { hours_remaining } => obj["hours_remaining"] = (*hours_remaining).into(),
            Finding::ExpiringSoon { days_remaining } => obj["days_remaining"] = (*days_remaining).into(),
            Finding::SunsetAlgorithm { algorithm_name, sunset_date } => {
                obj["algorithm"] = algorithm_name.as_str().into();
                obj["sunset_date"] = rfc3339(*sunset_date).into();
            }
        }
        writeln!(self.out, "{}", serde_json::to_string(&obj)?)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
