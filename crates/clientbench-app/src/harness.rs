//! Executes one adapter run: liveness, bounded dispatch, sampling.

use crate::Clock;
use crate::config::BenchConfig;
use clientbench_adapters::{AdapterError, ClientAdapter, ResourceProbe, ResourceSampler};
use clientbench_types::{
    AdapterRun, ErrorKind, FailureStage, HttpMethod, RequestResult, RequestSpec, ResourceSample,
    RunOutcome, Workload,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    pub concurrency: u32,
    pub request_timeout: Duration,
    pub run_timeout: Duration,
    pub liveness_timeout: Duration,
    pub liveness_path: String,
    pub sample_interval: Duration,
}

impl From<&BenchConfig> for HarnessSettings {
    fn from(cfg: &BenchConfig) -> Self {
        Self {
            concurrency: cfg.concurrency,
            request_timeout: cfg.request_timeout,
            run_timeout: cfg.run_timeout,
            liveness_timeout: cfg.liveness_timeout,
            liveness_path: cfg.liveness_path.clone(),
            sample_interval: cfg.sample_interval,
        }
    }
}

pub struct Harness {
    settings: HarnessSettings,
}

struct Dispatched {
    results: Vec<RequestResult>,
    deadline_exceeded: bool,
}

impl Harness {
    pub fn new(settings: HarnessSettings) -> Self {
        Self { settings }
    }

    /// Run `workload` through one adapter.
    ///
    /// `adapter` is the outcome of building the client; a build error becomes
    /// an init-stage structural failure. The returned run holds exactly one
    /// result per spec unless it failed structurally.
    pub async fn run<C: Clock, P: ResourceProbe>(
        &self,
        clock: &C,
        name: &str,
        adapter: Result<Arc<dyn ClientAdapter>, AdapterError>,
        workload: &Workload,
        probe: P,
    ) -> AdapterRun {
        let started_at = clock.now_rfc3339();

        let adapter = match adapter {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(adapter = name, error = %e, "adapter failed to initialize");
                return structural_failure(clock, name, started_at, FailureStage::Init, e.to_string());
            }
        };

        if let Err(reason) = self.check_liveness(adapter.as_ref()).await {
            tracing::error!(adapter = name, %reason, "target failed liveness check");
            return structural_failure(clock, name, started_at, FailureStage::Liveness, reason);
        }

        tracing::info!(
            adapter = name,
            requests = workload.len(),
            concurrency = self.settings.concurrency,
            "adapter run started"
        );

        let origin = Instant::now();
        let sampler = ResourceSampler::start(probe, origin, self.settings.sample_interval);
        let dispatched = self.dispatch(adapter, workload, origin).await;
        let samples: Vec<ResourceSample> = sampler.stop().await;

        if dispatched.deadline_exceeded {
            tracing::warn!(
                adapter = name,
                run_timeout = ?self.settings.run_timeout,
                "run timeout exceeded; outstanding requests cancelled"
            );
        }

        let successes = dispatched.results.iter().filter(|r| r.is_success()).count();
        tracing::info!(
            adapter = name,
            successes,
            results = dispatched.results.len(),
            elapsed_ms = origin.elapsed().as_millis() as u64,
            "adapter run finished"
        );

        AdapterRun {
            adapter: name.to_string(),
            started_at,
            ended_at: clock.now_rfc3339(),
            outcome: RunOutcome::Completed,
            deadline_exceeded: dispatched.deadline_exceeded,
            results: dispatched.results,
            samples,
        }
    }

    async fn check_liveness(&self, adapter: &dyn ClientAdapter) -> Result<(), String> {
        let spec = RequestSpec {
            seq: 0,
            method: HttpMethod::Get,
            path: self.settings.liveness_path.clone(),
            body_bytes: 0,
            expected_status: 200,
        };

        let result = tokio::time::timeout(self.settings.liveness_timeout, adapter.send(&spec))
            .await
            .map_err(|_| {
                format!(
                    "GET {} did not respond within {}",
                    spec.path,
                    humantime::format_duration(self.settings.liveness_timeout)
                )
            })?;

        match (result.error, result.status) {
            (None, _) => Ok(()),
            (Some(kind), Some(status)) => Err(format!("GET {} returned {status} ({kind})", spec.path)),
            (Some(kind), None) => Err(format!("GET {} failed: {kind}", spec.path)),
        }
    }

    async fn dispatch(
        &self,
        adapter: Arc<dyn ClientAdapter>,
        workload: &Workload,
        origin: Instant,
    ) -> Dispatched {
        let specs = &workload.specs;
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1) as usize));
        let mut tasks: JoinSet<RequestResult> = JoinSet::new();

        // seq -> issued_at_us for every spawned task that has not reported back.
        let mut in_flight: BTreeMap<usize, u64> = BTreeMap::new();
        let mut results: Vec<RequestResult> = Vec::with_capacity(specs.len());
        let mut next = 0usize;
        let mut deadline_exceeded = false;

        let deadline = tokio::time::sleep(self.settings.run_timeout);
        tokio::pin!(deadline);

        loop {
            if next == specs.len() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = &mut deadline => {
                    deadline_exceeded = true;
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    record(joined, &mut in_flight, &mut results);
                }

                Ok(permit) = semaphore.clone().acquire_owned(), if next < specs.len() => {
                    let spec = specs[next].clone();
                    next += 1;

                    let issued_at_us = micros(origin.elapsed());
                    in_flight.insert(spec.seq, issued_at_us);

                    let adapter = adapter.clone();
                    let timeout = self.settings.request_timeout;
                    tasks.spawn(async move {
                        let _permit = permit;
                        let start = Instant::now();
                        let result = match tokio::time::timeout(timeout, adapter.send(&spec)).await {
                            Ok(r) => r,
                            Err(_) => RequestResult::failure(
                                spec.seq,
                                micros(start.elapsed()),
                                None,
                                ErrorKind::Timeout,
                            ),
                        };
                        result.issued_at(issued_at_us)
                    });
                }
            }
        }

        if deadline_exceeded {
            tasks.abort_all();
            // Requests that finished before the abort landed still count.
            while let Some(joined) = tasks.join_next().await {
                record(joined, &mut in_flight, &mut results);
            }
        }

        let now_us = micros(origin.elapsed());
        for (seq, issued_at_us) in in_flight {
            results.push(cancelled(seq, issued_at_us, now_us));
        }
        for spec in &specs[next..] {
            results.push(cancelled(spec.seq, now_us, now_us));
        }

        Dispatched {
            results,
            deadline_exceeded,
        }
    }
}

fn record(
    joined: Result<RequestResult, tokio::task::JoinError>,
    in_flight: &mut BTreeMap<usize, u64>,
    results: &mut Vec<RequestResult>,
) {
    match joined {
        Ok(result) => {
            tracing::debug!(
                seq = result.seq,
                elapsed_us = result.elapsed_us,
                status = ?result.status,
                error = ?result.error,
                "request completed"
            );
            in_flight.remove(&result.seq);
            results.push(result);
        }
        // The seq stays in flight and is recorded as cancelled at the end.
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "adapter task panicked");
        }
        Err(_) => {}
    }
}

fn cancelled(seq: usize, issued_at_us: u64, now_us: u64) -> RequestResult {
    RequestResult::failure(
        seq,
        now_us.saturating_sub(issued_at_us),
        None,
        ErrorKind::Cancelled,
    )
    .issued_at(issued_at_us)
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

fn structural_failure<C: Clock>(
    clock: &C,
    name: &str,
    started_at: String,
    stage: FailureStage,
    reason: String,
) -> AdapterRun {
    AdapterRun {
        adapter: name.to_string(),
        started_at,
        ended_at: clock.now_rfc3339(),
        outcome: RunOutcome::StructuralFailure { stage, reason },
        deadline_exceeded: false,
        results: Vec::new(),
        samples: Vec::new(),
    }
}
