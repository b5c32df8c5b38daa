//! Verified chain reconstruction from the certificates a server presented.
//!
//! rustls reports the presented list only, so the chains the verifier could
//! have built are recovered by following issuer names from the leaf. Every
//! path ends at a trust anchor certificate, which is appended as the root
//! when the server did not send it.

use crate::cert::{parse_certificate, ParsedCert};
use certscan_core::{Chain, ChainSet};
use std::collections::HashMap;
use tracing::debug;

const MAX_CHAIN_DEPTH: usize = 8;

/// Trust anchor certificates indexed by their raw subject name.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    by_subject: HashMap<Vec<u8>, Vec<ParsedCert>>,
}

impl TrustAnchors {
    /// The Mozilla root program, as shipped by `webpki-root-certs`.
    pub fn webpki() -> Self {
        let mut anchors = Vec::with_capacity(webpki_root_certs::TLS_SERVER_ROOT_CERTS.len());
        for (i, der) in webpki_root_certs::TLS_SERVER_ROOT_CERTS.iter().enumerate() {
            match parse_certificate(i, der.as_ref()) {
                Ok(parsed) => anchors.push(parsed),
                Err(e) => debug!(error = %e, "skipping unparseable trust anchor"),
            }
        }
        Self::from_certs(anchors)
    }

    pub fn from_certs<I>(certs: I) -> Self
    where
        I: IntoIterator<Item = ParsedCert>,
    {
        let mut by_subject: HashMap<Vec<u8>, Vec<ParsedCert>> = HashMap::new();
        for cert in certs {
            by_subject.entry(cert.subject.clone()).or_default().push(cert);
        }
        TrustAnchors { by_subject }
    }

    /// Anchors whose subject matches `name`.
    pub fn issuers_of(&self, name: &[u8]) -> &[ParsedCert] {
        self.by_subject.get(name).map_or(&[], Vec::as_slice)
    }

    /// True when `cert` is byte-for-byte one of the anchors.
    pub fn contains(&self, cert: &ParsedCert) -> bool {
        self.issuers_of(&cert.subject).iter().any(|a| a.cert.fingerprint == cert.cert.fingerprint)
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }
}

/// A chain under construction: presented indices plus the closing anchor.
enum Link<'a> {
    Presented(usize),
    Anchor(&'a ParsedCert),
}

/// Every issuer path from the leaf (first presented certificate) to a
/// trust anchor.
///
/// A presented certificate that is itself an anchor closes the chain in
/// place. Otherwise any anchor issuing the current certificate is appended
/// as the root. Self-signed certificates outside the anchor set never close
/// a chain.
///
/// Falls back to the presented order as one chain when no path reaches an
/// anchor, which can only happen if the anchor list differs from the one the
/// handshake verified against.
pub fn verified_chains(presented: &[ParsedCert], anchors: &TrustAnchors) -> ChainSet {
    if presented.is_empty() {
        return Vec::new();
    }
    let mut chains = Vec::new();
    let mut path = vec![0];
    extend(presented, anchors, &mut path, &mut chains);

    if chains.is_empty() {
        return vec![presented_order(presented)];
    }
    chains
        .into_iter()
        .map(|links| {
            Chain::new(
                links
                    .into_iter()
                    .map(|link| match link {
                        Link::Presented(i) => presented[i].cert.clone(),
                        Link::Anchor(anchor) => anchor.cert.clone(),
                    })
                    .collect(),
            )
        })
        .collect()
}

fn extend<'a>(
    presented: &[ParsedCert],
    anchors: &'a TrustAnchors,
    path: &mut Vec<usize>,
    out: &mut Vec<Vec<Link<'a>>>,
) {
    let Some(current) = path.last().map(|&i| &presented[i]) else { return };
    if anchors.contains(current) {
        out.push(path.iter().map(|&i| Link::Presented(i)).collect());
        return;
    }
    for anchor in anchors.issuers_of(&current.issuer) {
        // an anchor never repeats a name already on the path
        if path.iter().any(|&i| presented[i].subject == anchor.subject) {
            continue;
        }
        let mut links: Vec<Link<'a>> = path.iter().map(|&i| Link::Presented(i)).collect();
        links.push(Link::Anchor(anchor));
        out.push(links);
    }
    if current.is_self_issued() || path.len() >= MAX_CHAIN_DEPTH {
        return;
    }
    for (i, candidate) in presented.iter().enumerate() {
        // a presented copy of an anchor was already closed by the loop above
        if path.contains(&i) || candidate.subject != current.issuer || anchors.contains(candidate) {
            continue;
        }
        path.push(i);
        extend(presented, anchors, path, out);
        path.pop();
    }
}

fn presented_order(presented: &[ParsedCert]) -> Chain {
    Chain::new(presented.iter().map(|p| p.cert.clone()).collect())
}

/// The insecure path: presented certificates as-is, last one in the root slot.
pub fn peer_chain(presented: Vec<ParsedCert>) -> ChainSet {
    if presented.is_empty() {
        return Vec::new();
    }
    vec![Chain::new(presented.into_iter().map(|p| p.cert).collect())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use certscan_core::{PresentedCert, SignatureAlgorithm};
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn parsed(subject: &str, issuer: &str, sig: u8) -> ParsedCert {
        parsed_until(subject, issuer, sig, datetime!(2030-01-01 0:00 UTC))
    }

    fn parsed_until(subject: &str, issuer: &str, sig: u8, not_after: OffsetDateTime) -> ParsedCert {
        ParsedCert {
            subject: subject.as_bytes().to_vec(),
            issuer: issuer.as_bytes().to_vec(),
            cert: PresentedCert {
                common_name: subject.into(),
                serial_number: vec![sig],
                not_after,
                signature_algorithm: SignatureAlgorithm::Sha256WithRsa,
                signature: vec![sig],
                fingerprint: format!("fp-{sig}"),
            },
        }
    }

    fn names(chain: &Chain) -> Vec<&str> {
        chain.certs.iter().map(|c| c.common_name.as_str()).collect()
    }

    #[test]
    fn anchor_outside_presented_list_is_appended_as_root() {
        let presented = vec![parsed("leaf", "Int", 1), parsed("Int", "Root", 2)];
        let anchors = TrustAnchors::from_certs([parsed("Root", "Root", 3)]);
        let chains = verified_chains(&presented, &anchors);
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "Root"]);
        assert_eq!(chains[0].certs[2].fingerprint, "fp-3");
    }

    #[test]
    fn presented_anchor_closes_the_chain_once() {
        let root = parsed("Root", "Root", 3);
        let presented = vec![parsed("leaf", "Int", 1), parsed("Int", "Root", 2), root.clone()];
        let chains = verified_chains(&presented, &TrustAnchors::from_certs([root]));
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "Root"]);
    }

    #[test]
    fn untrusted_self_signed_root_is_not_an_anchor() {
        let presented = vec![parsed("leaf", "Int", 1), parsed("Int", "Rogue", 2), parsed("Rogue", "Rogue", 3)];
        let anchors = TrustAnchors::from_certs([parsed("Root", "Root", 4)]);
        let chains = verified_chains(&presented, &anchors);
        // nothing reaches an anchor, so only the presented-order fallback remains
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "Rogue"]);

        let trusted = TrustAnchors::from_certs([parsed("Rogue", "Rogue", 4)]);
        let chains = verified_chains(&presented, &trusted);
        // a re-keyed anchor with the same name issues the presented copy
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "Rogue"]);
        assert_eq!(chains[0].certs[2].fingerprint, "fp-4");
    }

    #[test]
    fn cross_signed_intermediate_yields_two_chains() {
        // Int is issued by New, which Old cross-signed; both are anchors.
        let presented = vec![parsed("leaf", "Int", 1), parsed("Int", "New", 2), parsed("New", "Old", 3)];
        let anchors = TrustAnchors::from_certs([parsed("New", "New", 4), parsed("Old", "Old", 5)]);
        let chains = verified_chains(&presented, &anchors);
        assert_eq!(chains.len(), 2);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "New"]);
        assert_eq!(chains[0].certs[2].fingerprint, "fp-4");
        assert_eq!(names(&chains[1]), ["leaf", "Int", "New", "Old"]);
    }

    #[test]
    fn out_of_order_and_extra_certificates() {
        let presented = vec![
            parsed("leaf", "Int", 1),
            parsed("Unrelated", "Elsewhere", 9),
            parsed("Int", "Root", 2),
        ];
        let chains = verified_chains(&presented, &TrustAnchors::from_certs([parsed("Root", "Root", 3)]));
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Int", "Root"]);
    }

    #[test]
    fn no_path_falls_back_to_presented_order() {
        let presented = vec![parsed("leaf", "Int", 1), parsed("Other", "Root", 2)];
        let chains = verified_chains(&presented, &TrustAnchors::default());
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["leaf", "Other"]);
    }

    #[test]
    fn expiring_trust_store_root_is_evaluated() {
        use certscan_core::{dedup::dedup_chains, evaluate, Finding, SunsetTable, WarningPolicy};

        let now = datetime!(2024-03-10 12:00 UTC);
        let mut root = parsed_until("Root", "Root", 3, datetime!(2024-03-25 12:00 UTC));
        root.cert.signature_algorithm = SignatureAlgorithm::Sha1WithRsa;
        let presented = vec![parsed("leaf", "Int", 1), parsed("Int", "Root", 2)];
        let chains = verified_chains(&presented, &TrustAnchors::from_certs([root]));

        let records = dedup_chains(&chains);
        assert_eq!(records.len(), 3);
        let root_record = &records[2];
        assert_eq!(root_record.cert.common_name, "Root");
        assert!(root_record.is_root());

        let findings = evaluate(root_record, &WarningPolicy::default(), &SunsetTable::standard(now), now);
        assert_eq!(findings, vec![Finding::ExpiringSoon { days_remaining: 15 }]);
    }

    #[test]
    fn peer_chain_keeps_presented_order() {
        let chains = peer_chain(vec![parsed("self", "self", 1), parsed("extra", "x", 2)]);
        assert_eq!(chains.len(), 1);
        assert_eq!(names(&chains[0]), ["self", "extra"]);
        assert_eq!(chains[0].len(), 2);
        assert!(peer_chain(Vec::new()).is_empty());
    }

    #[test]
    fn webpki_anchor_set_is_populated() {
        assert!(!TrustAnchors::webpki().is_empty());
    }
}
