//! Bounded worker pool: targets in, one [`HostResult`] per target out.

use crate::cancel::CancelSignal;
use crate::dedup::dedup_chains;
use crate::error::ProbeError;
use crate::model::{CertificateFindings, ChainSet, HostResult, Outcome};
use crate::policy::{evaluate, SunsetTable, WarningPolicy};
use crate::target::TargetDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Opens one TLS session to a target and returns the chains it presented.
///
/// Implementations must release the connection before returning, on every
/// path.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &TargetDescriptor) -> Result<ChainSet, ProbeError>;
}

pub type Clock = fn() -> OffsetDateTime;

struct Shared<P> {
    probe: P,
    policy: WarningPolicy,
    sunsets: SunsetTable,
    clock: Clock,
}

type TargetQueue = Arc<Mutex<mpsc::Receiver<TargetDescriptor>>>;

pub struct Dispatcher<P> {
    shared: Arc<Shared<P>>,
}

impl<P: Probe + 'static> Dispatcher<P> {
    pub fn new(probe: P, policy: WarningPolicy, sunsets: SunsetTable) -> Self {
        Self::with_clock(probe, policy, sunsets, OffsetDateTime::now_utc)
    }

    pub fn with_clock(probe: P, policy: WarningPolicy, sunsets: SunsetTable, clock: Clock) -> Self {
        Dispatcher { shared: Arc::new(Shared { probe, policy, sunsets, clock }) }
    }

    /// Start `policy.concurrency` workers reading from `targets`.
    ///
    /// The returned stream closes once the input is exhausted (or
    /// cancellation is raised) and every in-flight probe has reported.
    pub fn spawn(
        &self,
        targets: mpsc::Receiver<TargetDescriptor>,
        cancel: CancelSignal,
    ) -> mpsc::UnboundedReceiver<HostResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: TargetQueue = Arc::new(Mutex::new(targets));
        for id in 0..self.shared.policy.concurrency.max(1) {
            tokio::spawn(run_worker(id, self.shared.clone(), queue.clone(), tx.clone(), cancel.clone()));
        }
        rx
    }

    /// Feed `targets` through a bounded queue and start the workers.
    pub fn scan(&self, targets: Vec<TargetDescriptor>, cancel: CancelSignal) -> mpsc::UnboundedReceiver<HostResult> {
        let (tx, rx) = mpsc::channel(self.shared.policy.concurrency.max(1));
        tokio::spawn(feed_targets(targets, tx, cancel.clone()));
        self.spawn(rx, cancel)
    }
}

/// Push targets onto the queue until done, the queue closes, or cancellation.
pub async fn feed_targets(targets: Vec<TargetDescriptor>, tx: mpsc::Sender<TargetDescriptor>, cancel: CancelSignal) {
    for target in targets {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled, no more targets queued");
                return;
            }
            sent = tx.send(target) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_worker<P: Probe>(
    id: usize,
    shared: Arc<Shared<P>>,
    queue: TargetQueue,
    results: mpsc::UnboundedSender<HostResult>,
    cancel: CancelSignal,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                target = queue.recv() => target,
            }
        };
        let Some(target) = next else { break };
        let result = scan_host(&shared.probe, target, &shared.policy, &shared.sunsets, shared.clock).await;
        if results.send(result).is_err() {
            break;
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    debug!(worker = id, "worker done");
}

/// Probe one target, dedupe its chains and evaluate every certificate.
pub async fn scan_host<P: Probe + ?Sized>(
    probe: &P,
    target: TargetDescriptor,
    policy: &WarningPolicy,
    sunsets: &SunsetTable,
    clock: Clock,
) -> HostResult {
    debug!(address = %target.address, mode = ?target.mode, "probing");
    let chains = match probe.probe(&target).await {
        Ok(chains) => chains,
        Err(e) => {
            warn!(address = %target.address, error = %e, "probe failed");
            return HostResult { target, outcome: Outcome::ConnectionError(e.to_string()) };
        }
    };
    let now = clock();
    let certs = dedup_chains(&chains)
        .into_iter()
        .map(|record| {
            let findings = evaluate(&record, policy, sunsets, now);
            CertificateFindings {
                common_name: record.cert.common_name,
                serial_number: record.cert.serial_number,
                fingerprint: record.cert.fingerprint,
                findings,
            }
        })
        .collect::<Vec<_>>();
    debug!(address = %target.address, chains = chains.len(), certificates = certs.len(), "probe complete");
    HostResult { target, outcome: Outcome::Findings(certs) }
}
