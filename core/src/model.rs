//! Certificate, finding and per-host result types shared across the pipeline.

use crate::target::TargetDescriptor;
use time::OffsetDateTime;

/// X.509 signature algorithms, keyed by their dotted OID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    Md2WithRsa,
    Md5WithRsa,
    Sha1WithRsa,
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    RsassaPss,
    DsaWithSha1,
    DsaWithSha256,
    EcdsaWithSha1,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    Ed25519,
    Ed448,
    Other(String),
}

impl SignatureAlgorithm {
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.2" => Self::Md2WithRsa,
            "1.2.840.113549.1.1.4" => Self::Md5WithRsa,
            "1.2.840.113549.1.1.5" => Self::Sha1WithRsa,
            "1.2.840.113549.1.1.11" => Self::Sha256WithRsa,
            "1.2.840.113549.1.1.12" => Self::Sha384WithRsa,
            "1.2.840.113549.1.1.13" => Self::Sha512WithRsa,
            "1.2.840.113549.1.1.10" => Self::RsassaPss,
            "1.2.840.10040.4.3" => Self::DsaWithSha1,
            "2.16.840.1.101.3.4.3.2" => Self::DsaWithSha256,
            "1.2.840.10045.4.1" => Self::EcdsaWithSha1,
            "1.2.840.10045.4.3.2" => Self::EcdsaWithSha256,
            "1.2.840.10045.4.3.3" => Self::EcdsaWithSha384,
            "1.2.840.10045.4.3.4" => Self::EcdsaWithSha512,
            "1.3.101.112" => Self::Ed25519,
            "1.3.101.113" => Self::Ed448,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Fields of one presented certificate, before its chain position is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCert {
    pub common_name: String,
    pub serial_number: Vec<u8>,
    pub not_after: OffsetDateTime,
    pub signature_algorithm: SignatureAlgorithm,
    /// Deduplication key within one host's chains.
    pub signature: Vec<u8>,
    /// SHA-256 of the DER encoding, for reports only.
    pub fingerprint: String,
}

/// One certificate chain, leaf first. The last certificate is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub certs: Vec<PresentedCert>,
}

impl Chain {
    pub fn new(certs: Vec<PresentedCert>) -> Self {
        Chain { certs }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// Chains obtained from one handshake, in the order they were produced.
pub type ChainSet = Vec<Chain>;

/// A unique certificate for one host together with its first-seen position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub cert: PresentedCert,
    pub chain_position: usize,
    pub chain_length: usize,
}

impl CertificateRecord {
    /// True when this record sits in the trust anchor slot of its chain.
    pub fn is_root(&self) -> bool {
        self.chain_position + 1 == self.chain_length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Expires within 48 hours (negative once already expired).
    ExpiringShortly { hours_remaining: i64 },
    /// Expires inside the configured warning window.
    ExpiringSoon { days_remaining: i64 },
    /// Signed with a deprecated algorithm and valid past its sunset date.
    SunsetAlgorithm { algorithm_name: String, sunset_date: OffsetDateTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFindings {
    pub common_name: String,
    pub serial_number: Vec<u8>,
    pub fingerprint: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ConnectionError(String),
    Findings(Vec<CertificateFindings>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub target: TargetDescriptor,
    pub outcome: Outcome,
}

/// Uppercase hex serial without leading zeros, `0` for an all-zero serial.
pub fn serial_hex(serial: &[u8]) -> String {
    let out = hex::encode_upper(serial);
    let trimmed = out.trim_start_matches('0');
    if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_oids_map_to_variants() {
        assert_eq!(SignatureAlgorithm::from_oid("1.2.840.113549.1.1.5"), SignatureAlgorithm::Sha1WithRsa);
        assert_eq!(SignatureAlgorithm::from_oid("1.2.840.10045.4.1"), SignatureAlgorithm::EcdsaWithSha1);
        assert_eq!(
            SignatureAlgorithm::from_oid("1.2.3.4"),
            SignatureAlgorithm::Other("1.2.3.4".into())
        );
    }

    #[test]
    fn serial_hex_strips_leading_zeros() {
        assert_eq!(serial_hex(&[0x00, 0x0A, 0xBC]), "ABC");
        assert_eq!(serial_hex(&[0x00]), "0");
        assert_eq!(serial_hex(&[]), "0");
        assert_eq!(serial_hex(&[0x10, 0x01]), "1001");
    }
}
