use crate::config::BenchConfig;
use crate::harness::{Harness, HarnessSettings};
use crate::report::ReportUseCase;
use crate::Clock;
use anyhow::Context;
use clientbench_adapters::{
    AdapterFactory, ClientOptions, HostProbe, ProbeReading, ResourceProbe, SysinfoProbe,
};
use clientbench_domain::generate_workload;
use clientbench_types::{
    AdapterRun, BenchReport, RunMeta, RunsReceipt, ToolInfo, Workload, RUNS_SCHEMA_V1,
};

/// Builds a fresh resource probe for each adapter run.
pub type ProbeFactory = Box<dyn Fn() -> Box<dyn ResourceProbe> + Send + Sync>;

/// Probe for the current process, or one that never reads if the process is not visible.
pub fn std_probe() -> Box<dyn ResourceProbe> {
    match SysinfoProbe::current_process() {
        Ok(p) => Box::new(p),
        Err(e) => {
            tracing::warn!(error = %e, "resource sampling disabled");
            Box::new(NoProbe)
        }
    }
}

struct NoProbe;

impl ResourceProbe for NoProbe {
    fn read(&mut self) -> Option<ProbeReading> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct BenchRequest {
    pub config: BenchConfig,
}

#[derive(Debug, Clone)]
pub struct BenchOutcome {
    pub workload: Workload,
    pub receipt: RunsReceipt,
    pub report: BenchReport,
}

pub struct BenchUseCase<F: AdapterFactory, C: Clock, H: HostProbe> {
    factory: F,
    clock: C,
    host: H,
    probe: ProbeFactory,
    tool: ToolInfo,
}

impl<F: AdapterFactory, C: Clock, H: HostProbe> BenchUseCase<F, C, H> {
    pub fn new(factory: F, clock: C, host: H, probe: ProbeFactory, tool: ToolInfo) -> Self {
        Self {
            factory,
            clock,
            host,
            probe,
            tool,
        }
    }

    /// Drive every configured adapter with the same workload, one after another.
    ///
    /// Per-adapter failures never abort the bench; they surface in the report.
    /// Errors here are tool errors (e.g. an invalid endpoint mix).
    pub async fn execute(&self, req: BenchRequest) -> anyhow::Result<BenchOutcome> {
        let cfg = req.config;

        let workload = generate_workload(&cfg.workload_config())
            .context("failed to generate workload")?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = self.clock.now_rfc3339();

        tracing::info!(
            run_id = %run_id,
            target = %cfg.target,
            requests = workload.len(),
            adapters = ?cfg.adapters,
            "bench started"
        );

        let harness = Harness::new(HarnessSettings::from(&cfg));
        let options = ClientOptions::new(cfg.target.clone());

        let mut runs: Vec<AdapterRun> = Vec::with_capacity(cfg.adapters.len());
        for (i, name) in cfg.adapters.iter().enumerate() {
            if i > 0 && !cfg.cooldown.is_zero() {
                tracing::info!(cooldown = ?cfg.cooldown, "cooling down before next adapter");
                tokio::time::sleep(cfg.cooldown).await;
            }

            let adapter = self.factory.build(name, &options);
            let run = harness
                .run(&self.clock, name, adapter, &workload, (self.probe)())
                .await;
            runs.push(run);
        }

        let receipt = RunsReceipt {
            schema: RUNS_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                id: run_id,
                started_at,
                ended_at: self.clock.now_rfc3339(),
                host: self.host.probe(),
            },
            bench: cfg.meta(),
            workload: workload.clone(),
            runs,
        };

        let report = ReportUseCase::from_receipt(&receipt)?;

        tracing::info!(
            verdict = ?report.verdict.status,
            pass = report.verdict.counts.pass,
            fail = report.verdict.counts.fail,
            "bench finished"
        );

        Ok(BenchOutcome {
            workload,
            receipt,
            report,
        })
    }
}
