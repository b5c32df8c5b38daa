//! Core types and pipeline for the certificate health scanner.
//!
//! Targets flow from [`target::parse_lines`] into the [`pool::Dispatcher`],
//! each worker runs probe, [`dedup::dedup_chains`] and [`policy::evaluate`],
//! and the resulting [`model::HostResult`] stream is drained by
//! [`aggregate::aggregate`].

pub mod aggregate;
pub mod cancel;
pub mod dedup;
pub mod error;
pub mod model;
pub mod policy;
pub mod pool;
pub mod target;

pub use cancel::CancelSignal;
pub use error::ProbeError;
pub use model::{
    CertificateFindings, CertificateRecord, Chain, ChainSet, Finding, HostResult, Outcome,
    PresentedCert, SignatureAlgorithm,
};
pub use policy::{evaluate, SunsetTable, WarningPolicy};
pub use pool::{Dispatcher, Probe};
pub use target::{TargetDescriptor, VerificationMode};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
