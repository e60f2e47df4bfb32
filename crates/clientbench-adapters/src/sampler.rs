//! Periodic process resource sampling alongside a run.

use crate::{elapsed_us, AdapterError};
use clientbench_types::ResourceSample;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub rss_bytes: u64,
    /// `None` until enough time has passed since the last CPU measurement.
    pub cpu_percent: Option<f64>,
}

/// Source of resource readings. `None` means the reading is unavailable this tick.
pub trait ResourceProbe: Send + 'static {
    fn read(&mut self) -> Option<ProbeReading>;
}

impl ResourceProbe for Box<dyn ResourceProbe> {
    fn read(&mut self) -> Option<ProbeReading> {
        (**self).read()
    }
}

/// Reads RSS and CPU% of the current process.
///
/// sysinfo only computes process CPU usage on a full process refresh, and
/// only relative to the previous one. The probe is primed on construction and
/// measures CPU at most once per [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`];
/// readings in between carry RSS only.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
    cpu_refreshed_at: Instant,
}

impl SysinfoProbe {
    pub fn current_process() -> Result<Self, AdapterError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| AdapterError::ProbeUnavailable(e.to_string()))?;

        let mut system = System::new();
        refresh_cpu(&mut system);
        if system.process(pid).is_none() {
            return Err(AdapterError::ProbeUnavailable(format!(
                "process {pid} not visible"
            )));
        }

        Ok(Self {
            system,
            pid,
            cpu_refreshed_at: Instant::now(),
        })
    }
}

fn refresh_cpu(system: &mut System) {
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cpu().with_memory(),
    );
}

impl ResourceProbe for SysinfoProbe {
    fn read(&mut self) -> Option<ProbeReading> {
        let measure_cpu = self.cpu_refreshed_at.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL;

        if measure_cpu {
            refresh_cpu(&mut self.system);
            self.cpu_refreshed_at = Instant::now();
        } else {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[self.pid]),
                false,
                ProcessRefreshKind::new().with_memory(),
            );
        }

        let process = self.system.process(self.pid)?;
        Some(ProbeReading {
            rss_bytes: process.memory(),
            cpu_percent: measure_cpu.then(|| f64::from(process.cpu_usage())),
        })
    }
}

pub struct ResourceSampler;

impl ResourceSampler {
    /// Take one sample now, then one every `interval` until stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P: ResourceProbe>(
        mut probe: P,
        origin: Instant,
        interval: Duration,
    ) -> SamplerHandle {
        let interval = interval.max(Duration::from_millis(1));

        let mut samples = Vec::new();
        push_sample(&mut probe, origin, &mut samples);

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => push_sample(&mut probe, origin, &mut samples),
                }
            }

            push_sample(&mut probe, origin, &mut samples);
            samples
        });

        SamplerHandle { stop_tx, task }
    }
}

fn push_sample<P: ResourceProbe>(probe: &mut P, origin: Instant, out: &mut Vec<ResourceSample>) {
    if let Some(reading) = probe.read() {
        out.push(ResourceSample {
            at_us: elapsed_us(origin.elapsed()),
            rss_bytes: reading.rss_bytes,
            cpu_percent: reading.cpu_percent,
        });
    }
}

pub struct SamplerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<Vec<ResourceSample>>,
}

impl SamplerHandle {
    /// Signal the sampler, take the final sample, and collect everything.
    pub async fn stop(self) -> Vec<ResourceSample> {
        // The receiver only disappears if the task already ended.
        let _ = self.stop_tx.send(());
        match self.task.await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "resource sampler task failed; samples lost");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingProbe {
        reads: Arc<AtomicU64>,
    }

    impl ResourceProbe for CountingProbe {
        fn read(&mut self) -> Option<ProbeReading> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            Some(ProbeReading {
                rss_bytes: 1_000 + n,
                cpu_percent: Some(n as f64),
            })
        }
    }

    struct BlindProbe;

    impl ResourceProbe for BlindProbe {
        fn read(&mut self) -> Option<ProbeReading> {
            None
        }
    }

    #[tokio::test]
    async fn immediate_stop_brackets_with_two_samples() {
        let reads = Arc::new(AtomicU64::new(0));
        let handle = ResourceSampler::start(
            CountingProbe {
                reads: reads.clone(),
            },
            Instant::now(),
            Duration::from_secs(60),
        );
        // First sample is taken synchronously.
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        let samples = handle.stop().await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].rss_bytes, 1_000);
        assert_eq!(samples[1].rss_bytes, 1_001);
    }

    #[tokio::test]
    async fn samples_periodically_in_time_order() {
        let reads = Arc::new(AtomicU64::new(0));
        let handle = ResourceSampler::start(
            CountingProbe { reads },
            Instant::now(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        let samples = handle.stop().await;

        assert!(samples.len() >= 4, "got {} samples", samples.len());
        for w in samples.windows(2) {
            assert!(w[0].at_us <= w[1].at_us);
        }
    }

    #[tokio::test]
    async fn unavailable_readings_are_skipped() {
        let handle = ResourceSampler::start(BlindProbe, Instant::now(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.stop().await.is_empty());
    }

    #[test]
    fn sysinfo_withholds_cpu_right_after_priming() {
        let mut probe = SysinfoProbe::current_process().unwrap();
        let reading = probe.read().expect("current process is visible");
        assert!(reading.rss_bytes > 0);
        assert_eq!(reading.cpu_percent, None);
    }

    #[test]
    fn sysinfo_sees_a_busy_core() {
        use std::sync::atomic::AtomicBool;

        let mut probe = SysinfoProbe::current_process().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let spinner = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut x = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    x = std::hint::black_box(x.wrapping_add(1));
                }
                x
            })
        };

        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL * 2);
        let reading = probe.read().expect("current process is visible");
        stop.store(true, Ordering::Relaxed);
        spinner.join().unwrap();

        let cpu = reading.cpu_percent.expect("interval elapsed, cpu measured");
        assert!(cpu > 10.0, "busy thread should register, got {cpu}%");
    }
}
