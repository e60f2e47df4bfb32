#![no_main]

use arbitrary::Arbitrary;
use clientbench_domain::{WorkloadConfig, generate_workload};
use clientbench_types::{EndpointConfig, PayloadConfig};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    request_count: u16,
    seed: u64,
    endpoints: Vec<EndpointConfig>,
    payloads: Vec<PayloadConfig>,
}

fuzz_target!(|input: Input| {
    let config = WorkloadConfig {
        request_count: u32::from(input.request_count),
        seed: input.seed,
        endpoints: input.endpoints,
        payloads: input.payloads,
    };

    if let Ok(workload) = generate_workload(&config) {
        assert_eq!(workload.specs.len(), config.request_count as usize);
        for (i, spec) in workload.specs.iter().enumerate() {
            assert_eq!(spec.seq, i);
            assert!(spec.path.starts_with('/'));
        }
        assert_eq!(generate_workload(&config).ok(), Some(workload));
    }
});
