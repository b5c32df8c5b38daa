//! Collapse repeated certificates across a host's chains.

use crate::model::{CertificateRecord, ChainSet};
use std::collections::HashSet;

/// Flatten `chains` into unique records, keyed on signature bytes.
///
/// Chains are walked in order and each chain leaf first. The first
/// occurrence of a certificate fixes its position and chain length.
pub fn dedup_chains(chains: &ChainSet) -> Vec<CertificateRecord> {
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut records = Vec::new();
    for chain in chains {
        let chain_length = chain.len();
        for (chain_position, cert) in chain.certs.iter().enumerate() {
            if !seen.insert(cert.signature.as_slice()) {
                continue;
            }
            records.push(CertificateRecord { cert: cert.clone(), chain_position, chain_length });
        }
    }
    records
}
