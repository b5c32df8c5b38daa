//! Warning policy, signature algorithm sunsets and certificate evaluation.

use crate::model::{CertificateRecord, Finding, SignatureAlgorithm};
use std::collections::HashMap;
use time::macros::datetime;
use time::{Date, Duration, Month, OffsetDateTime};
use tracing::warn;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_WARN_DAYS: u32 = 30;

/// Expiry horizon at or under which a certificate is reported in hours.
const SHORT_HORIZON_HOURS: i64 = 48;

/// Run-wide, read-only scan configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningPolicy {
    pub warn_years: u32,
    pub warn_months: u32,
    pub warn_days: u32,
    pub check_signature_algorithm: bool,
    pub concurrency: usize,
}

impl Default for WarningPolicy {
    fn default() -> Self {
        WarningPolicy {
            warn_years: 0,
            warn_months: 0,
            warn_days: DEFAULT_WARN_DAYS,
            check_signature_algorithm: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl WarningPolicy {
    /// Build a policy from raw user values.
    ///
    /// Negative window parts clamp to zero, an all-zero window becomes
    /// 30 days, and a non-positive concurrency falls back to 8.
    pub fn resolve(years: i64, months: i64, days: i64, check_signature_algorithm: bool, concurrency: i64) -> Self {
        let clamp = |name: &str, v: i64| -> u32 {
            if v < 0 {
                warn!(field = name, value = v, "negative warning window clamped to 0");
                0
            } else {
                u32::try_from(v).unwrap_or(u32::MAX)
            }
        };
        let warn_years = clamp("years", years);
        let warn_months = clamp("months", months);
        let mut warn_days = clamp("days", days);
        if warn_years == 0 && warn_months == 0 && warn_days == 0 {
            warn_days = DEFAULT_WARN_DAYS;
        }
        let concurrency = match usize::try_from(concurrency) {
            Ok(n) if n > 0 => n,
            _ => {
                warn!(value = concurrency, default = DEFAULT_CONCURRENCY, "invalid concurrency, using default");
                DEFAULT_CONCURRENCY
            }
        };
        WarningPolicy { warn_years, warn_months, warn_days, check_signature_algorithm, concurrency }
    }

    /// End of the warning window when starting from `now`.
    pub fn cutoff(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        add_date(now, self.warn_years, self.warn_months, self.warn_days)
    }
}

/// Calendar-aware offset: years and months move the calendar date and an
/// overflowing day rolls into the next month (Jan 31 + 1 month = Mar 3 or
/// Mar 2 in a leap year). Days are a fixed offset. Time of day is kept.
pub fn add_date(t: OffsetDateTime, years: u32, months: u32, days: u32) -> Option<OffsetDateTime> {
    let month0 = i64::from(u8::from(t.month())) - 1 + i64::from(months);
    let year = i64::from(t.year()) + i64::from(years) + month0.div_euclid(12);
    let month = Month::try_from(u8::try_from(month0.rem_euclid(12) + 1).ok()?).ok()?;
    let first = Date::from_calendar_date(i32::try_from(year).ok()?, month, 1).ok()?;
    let date = first.checked_add(Duration::days(i64::from(t.day()) - 1 + i64::from(days)))?;
    Some(t.replace_date(date))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sunset {
    pub name: String,
    pub sunsets_at: OffsetDateTime,
}

/// Deprecated signature algorithms and the date each stops being acceptable.
#[derive(Debug, Clone, Default)]
pub struct SunsetTable {
    entries: HashMap<SignatureAlgorithm, Sunset>,
}

impl SunsetTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard table. MD2 and MD5 sunset at `now`, i.e. always.
    pub fn standard(now: OffsetDateTime) -> Self {
        let sha1_sunset = datetime!(2017-01-01 0:00 UTC);
        let mut table = Self::empty();
        table.insert(SignatureAlgorithm::Md2WithRsa, "MD2 with RSA", now);
        table.insert(SignatureAlgorithm::Md5WithRsa, "MD5 with RSA", now);
        table.insert(SignatureAlgorithm::Sha1WithRsa, "SHA1 with RSA", sha1_sunset);
        table.insert(SignatureAlgorithm::DsaWithSha1, "DSA with SHA1", sha1_sunset);
        table.insert(SignatureAlgorithm::EcdsaWithSha1, "ECDSA with SHA1", sha1_sunset);
        table
    }

    pub fn insert(&mut self, alg: SignatureAlgorithm, name: &str, sunsets_at: OffsetDateTime) {
        self.entries.insert(alg, Sunset { name: name.to_string(), sunsets_at });
    }

    pub fn get(&self, alg: &SignatureAlgorithm) -> Option<&Sunset> {
        self.entries.get(alg)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Evaluate one certificate. Expiration findings always precede algorithm
/// findings; an empty result means the certificate is healthy.
pub fn evaluate(
    record: &CertificateRecord,
    policy: &WarningPolicy,
    sunsets: &SunsetTable,
    now: OffsetDateTime,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let not_after = record.cert.not_after;

    // An unrepresentable cutoff lies beyond every certificate's expiry.
    let expiring = policy.cutoff(now).map_or(true, |cutoff| cutoff > not_after);
    if expiring {
        let hours_remaining = (not_after - now).whole_hours();
        if hours_remaining <= SHORT_HORIZON_HOURS {
            findings.push(Finding::ExpiringShortly { hours_remaining });
        } else {
            findings.push(Finding::ExpiringSoon { days_remaining: hours_remaining / 24 });
        }
    }

    // The root's own signature is never checked.
    if policy.check_signature_algorithm && !record.is_root() {
        if let Some(sunset) = sunsets.get(&record.cert.signature_algorithm) {
            if not_after >= sunset.sunsets_at {
                findings.push(Finding::SunsetAlgorithm {
                    algorithm_name: sunset.name.clone(),
                    sunset_date: sunset.sunsets_at,
                });
            }
        }
    }

    findings
}
