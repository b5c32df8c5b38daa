//! TLS probe: one rustls handshake per target, returning the chains seen.

pub mod cert;
pub mod chain;
pub mod verifier;

use async_trait::async_trait;
use certscan_core::{ChainSet, Probe, ProbeError, TargetDescriptor, VerificationMode};
use chain::TrustAnchors;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use verifier::AcceptAnyCert;

/// Probe backed by the webpki root set for verified targets and an
/// accept-anything verifier for insecure ones. The same roots, as full
/// certificates, close the reconstructed chains.
///
/// No connect or handshake timeout is applied.
pub struct TlsProbe {
    verified: TlsConnector,
    insecure: TlsConnector,
    anchors: TrustAnchors,
}

impl TlsProbe {
    pub fn new() -> Result<Self, ProbeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let verified = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let insecure = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new(provider)))
            .with_no_client_auth();

        let anchors = TrustAnchors::webpki();
        if anchors.is_empty() {
            return Err(ProbeError::Tls("no usable trust anchors".into()));
        }

        Ok(TlsProbe {
            verified: TlsConnector::from(Arc::new(verified)),
            insecure: TlsConnector::from(Arc::new(insecure)),
            anchors,
        })
    }
}

#[async_trait]
impl Probe for TlsProbe {
    async fn probe(&self, target: &TargetDescriptor) -> Result<ChainSet, ProbeError> {
        let (host, port) = split_address(&target.address)?;
        let name = server_name(host)?;
        let connector = match target.mode {
            VerificationMode::Verified => &self.verified,
            VerificationMode::InsecureAccepted => &self.insecure,
        };

        let stream = TcpStream::connect((host, port)).await.map_err(ProbeError::Connect)?;
        let mut tls = connector.connect(name, stream).await.map_err(ProbeError::Handshake)?;
        let presented = tls
            .get_ref()
            .1
            .peer_certificates()
            .map(|certs| certs.to_vec())
            .unwrap_or_default();
        // Best effort close_notify; the socket is released on drop either way.
        let _ = tls.shutdown().await;
        drop(tls);

        if presented.is_empty() {
            return Err(ProbeError::NoCertificates);
        }
        let parsed = cert::parse_all(presented.iter().map(|c| c.as_ref()))?;
        debug!(address = %target.address, presented = parsed.len(), "handshake complete");
        Ok(match target.mode {
            VerificationMode::Verified => chain::verified_chains(&parsed, &self.anchors),
            VerificationMode::InsecureAccepted => chain::peer_chain(parsed),
        })
    }
}

/// Split `host:port`, accepting bracketed IPv6 literals.
pub fn split_address(address: &str) -> Result<(&str, u16), ProbeError> {
    let invalid = || ProbeError::InvalidAddress(address.to_string());
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}

fn server_name(host: &str) -> Result<ServerName<'static>, ProbeError> {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => Ok(ServerName::IpAddress(ip.into())),
        Err(_) => ServerName::try_from(host.to_owned()).map_err(|_| ProbeError::InvalidServerName(host.to_string())),
    }
}
