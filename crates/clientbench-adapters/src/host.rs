use clientbench_types::HostInfo;

/// Describes the machine a bench ran on.
pub trait HostProbe {
    fn probe(&self) -> HostInfo;
}

#[derive(Debug, Default, Clone)]
pub struct StdHostProbe;

impl HostProbe for StdHostProbe {
    fn probe(&self) -> HostInfo {
        HostInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: u32::try_from(num_cpus::get()).ok(),
            hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
        }
    }
}
