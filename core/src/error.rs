use thiserror::Error;

/// Reasons a host probe produced no certificates.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid address {0:?}: expected host:port")]
    InvalidAddress(String),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("tls configuration: {0}")]
    Tls(String),

    #[error("server presented no certificates")]
    NoCertificates,

    #[error("certificate {index} could not be parsed: {reason}")]
    Certificate { index: usize, reason: String },
}
