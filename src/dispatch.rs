use futures::future::join_all;
use std::time::Instant;

use crate::models::{CheckKind, FailureKind, ProbeOutcome, VantageResults, VantagePoint};
use crate::probe::{normalize::normalize, ProbeSet};

/// Fans a check out to every selected vantage point at once.
///
/// One task per vantage point; a task that panics or is aborted only costs
/// its own entry, which is replaced by a synthetic error outcome.
#[derive(Clone)]
pub struct Dispatcher {
    probes: ProbeSet,
}

impl Dispatcher {
    pub fn new(probes: ProbeSet) -> Self {
        Self { probes }
    }

    /// Run `kind` against `target` from every vantage point. The result has
    /// exactly one entry per distinct vantage-point key.
    pub async fn run(
        &self,
        kind: CheckKind,
        target: &str,
        vantage_points: &[VantagePoint],
    ) -> VantageResults {
        let Some(probe) = self.probes.get(kind) else {
            tracing::error!("No runner registered for {} checks", kind);
            return vantage_points
                .iter()
                .map(|vp| {
                    (
                        vp.key().to_string(),
                        vec![ProbeOutcome::error(
                            FailureKind::TransportError,
                            format!("No runner for {} checks", kind),
                        )],
                    )
                })
                .collect();
        };

        let start = Instant::now();
        let mut keys = Vec::with_capacity(vantage_points.len());
        let mut workers = Vec::with_capacity(vantage_points.len());

        for vantage in vantage_points {
            let probe = probe.clone();
            let vantage = vantage.clone();
            let target = target.to_string();

            keys.push(vantage.key().to_string());
            workers.push(tokio::spawn(async move {
                normalize(probe.execute(&target, &vantage).await)
            }));
        }

        let joined = join_all(workers).await;

        let results: VantageResults = keys
            .into_iter()
            .zip(joined)
            .map(|(key, joined)| {
                let outcomes = match joined {
                    Ok(outcomes) => outcomes,
                    Err(e) => {
                        let reason = if e.is_panic() { "panicked" } else { "was cancelled" };
                        tracing::error!("{} probe task for {} {}", kind, key, reason);
                        vec![ProbeOutcome::error(
                            FailureKind::TransportError,
                            format!("Probe task {}", reason),
                        )]
                    }
                };
                (key, outcomes)
            })
            .collect();

        tracing::info!(
            "{} check of {} finished on {} vantage points in {:?}",
            kind,
            target,
            results.len(),
            start.elapsed()
        );

        results
    }
}
