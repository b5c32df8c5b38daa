//! X.509 field extraction.

use certscan_core::{PresentedCert, ProbeError, SignatureAlgorithm};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

/// A decoded certificate plus the raw names needed for path building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCert {
    pub subject: Vec<u8>,
    pub issuer: Vec<u8>,
    pub cert: PresentedCert,
}

impl ParsedCert {
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }
}

/// Decode the certificate at `index` of a presented list.
pub fn parse_certificate(index: usize, der: &[u8]) -> Result<ParsedCert, ProbeError> {
    let (_, x509) = X509Certificate::from_der(der)
        .map_err(|e| ProbeError::Certificate { index, reason: e.to_string() })?;
    let common_name = x509
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("")
        .to_string();
    let oid = x509.signature_algorithm.algorithm.to_id_string();
    Ok(ParsedCert {
        subject: x509.subject().as_raw().to_vec(),
        issuer: x509.issuer().as_raw().to_vec(),
        cert: PresentedCert {
            common_name,
            serial_number: x509.raw_serial().to_vec(),
            not_after: x509.validity().not_after.to_datetime(),
            signature_algorithm: SignatureAlgorithm::from_oid(&oid),
            signature: x509.signature_value.data.to_vec(),
            fingerprint: hex::encode(Sha256::digest(der)),
        },
    })
}

pub fn parse_all<'a, I>(ders: I) -> Result<Vec<ParsedCert>, ProbeError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    ders.into_iter().enumerate().map(|(i, der)| parse_certificate(i, der)).collect()
}
