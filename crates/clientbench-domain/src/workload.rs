//! Deterministic workload generation.

use crate::DomainError;
use clientbench_types::{EndpointConfig, PayloadConfig, RequestSpec, Workload};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    pub request_count: u32,
    pub seed: u64,
    pub endpoints: Vec<EndpointConfig>,
    pub payloads: Vec<PayloadConfig>,
}

/// Generate the request sequence every adapter is driven with.
///
/// The same config always yields the same sequence. Each slot picks an
/// endpoint by weight; body-carrying methods additionally pick a payload size
/// by weight, everything else gets an empty body.
pub fn generate_workload(config: &WorkloadConfig) -> Result<Workload, DomainError> {
    let endpoint_total = total_weight(config.endpoints.iter().map(|e| e.weight));
    if config.endpoints.is_empty() || endpoint_total == 0 {
        return Err(DomainError::EmptyEndpointMix);
    }

    let needs_payload = config.endpoints.iter().any(|e| e.method.carries_body() && e.weight > 0);
    let payload_total = total_weight(config.payloads.iter().map(|p| p.weight));
    if needs_payload && payload_total == 0 {
        return Err(DomainError::EmptyPayloadMix);
    }

    for e in &config.endpoints {
        if !e.path.starts_with('/') {
            return Err(DomainError::InvalidPath(e.path.clone()));
        }
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut specs = Vec::with_capacity(config.request_count as usize);

    for seq in 0..config.request_count as usize {
        let endpoint = pick(&mut rng, &config.endpoints, endpoint_total, |e| e.weight);
        let body_bytes = if endpoint.method.carries_body() {
            pick(&mut rng, &config.payloads, payload_total, |p| p.weight).bytes
        } else {
            0
        };

        specs.push(RequestSpec {
            seq,
            method: endpoint.method,
            path: endpoint.path.clone(),
            body_bytes,
            expected_status: endpoint.expected_status,
        });
    }

    Ok(Workload {
        seed: config.seed,
        specs,
    })
}

fn total_weight(weights: impl Iterator<Item = u32>) -> u64 {
    weights.map(u64::from).sum()
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T], total: u64, weight: impl Fn(&T) -> u32) -> &'a T {
    debug_assert!(total > 0);
    let mut roll = rng.random_range(0..total);
    for item in items {
        let w = u64::from(weight(item));
        if roll < w {
            return item;
        }
        roll -= w;
    }
    // Unreachable while total is the sum of the weights.
    &items[items.len() - 1]
}
