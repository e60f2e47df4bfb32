//! End-to-end tests: real adapters, real harness, local wiremock echo server.

use clientbench_adapters::{StdAdapterFactory, StdHostProbe};
use clientbench_app::{
    BenchOutcome, BenchRequest, BenchUseCase, ConfigOverrides, SystemClock, resolve_config,
    std_probe,
};
use clientbench_types::{
    AdapterStatus, ConfigFile, FailureStage, HttpMethod, RunOutcome, ToolInfo, VerdictStatus,
};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn echo_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/200"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    server
}

const MIX: &str = r#"
[bench]
request_count = 40
concurrency = 4
seed = 11
sample_interval = "10ms"

[[endpoint]]
method = "GET"
path = "/get"
weight = 3

[[endpoint]]
method = "POST"
path = "/post"
expected_status = 201
weight = 1

[[payload]]
bytes = 256
"#;

async fn bench(target: String, adapters: &[&str]) -> BenchOutcome {
    let file: ConfigFile = toml::from_str(MIX).expect("mix parses");
    let overrides = ConfigOverrides {
        target: Some(target),
        adapters: Some(adapters.iter().map(|a| a.to_string()).collect()),
        ..Default::default()
    };
    let config = resolve_config(&file, &overrides).expect("valid configuration");

    BenchUseCase::new(
        StdAdapterFactory,
        SystemClock,
        StdHostProbe,
        Box::new(std_probe),
        ToolInfo {
            name: "clientbench".to_string(),
            version: "0.0.0-test".to_string(),
        },
    )
    .execute(BenchRequest { config })
    .await
    .expect("bench should not hit a tool error")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_adapter_sends_the_same_mix() {
    let server = echo_server().await;
    let adapters = ["reqwest", "reqwest-http1", "reqwest-unpooled", "hyper"];
    let outcome = bench(server.uri(), &adapters).await;

    assert_eq!(outcome.report.verdict.status, VerdictStatus::Pass);
    assert_eq!(outcome.report.ranking.len(), adapters.len());

    let posts = outcome
        .workload
        .specs
        .iter()
        .filter(|s| s.method == HttpMethod::Post)
        .count();
    assert!(posts > 0 && posts < 40);

    let received = server.received_requests().await.expect("recording enabled");
    let mut per_path: BTreeMap<String, usize> = BTreeMap::new();
    for req in &received {
        *per_path.entry(req.url.path().to_string()).or_default() += 1;
    }

    // One liveness probe per adapter, then the full workload.
    assert_eq!(per_path["/status/200"], adapters.len());
    assert_eq!(per_path["/post"], posts * adapters.len());
    assert_eq!(per_path["/get"], (40 - posts) * adapters.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn payloads_arrive_with_the_configured_size() {
    let server = echo_server().await;
    bench(server.uri(), &["hyper", "reqwest"]).await;

    let received = server.received_requests().await.expect("recording enabled");
    let posts: Vec<_> = received
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert!(!posts.is_empty());
    for req in posts {
        assert_eq!(req.body.len(), 256);
    }
    for req in received.iter().filter(|r| r.method.as_str() == "GET") {
        assert!(req.body.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summaries_carry_latency_and_resources() {
    let server = echo_server().await;
    let outcome = bench(server.uri(), &["reqwest"]).await;

    let entry = &outcome.report.adapters[0];
    assert_eq!(entry.status, AdapterStatus::Pass);
    let summary = entry.summary.as_ref().expect("completed run has a summary");
    assert_eq!(summary.request_count, 40);
    assert_eq!(summary.success_count, 40);
    assert!(summary.throughput_per_s > 0.0);

    let lat = summary.latency_ms.as_ref().expect("latencies");
    assert!(lat.min <= lat.p50 && lat.p50 <= lat.p90 && lat.p90 <= lat.p99);
    assert!(lat.p99 <= lat.max);

    assert!(summary.peak_rss_bytes.is_some_and(|b| b > 0));
    assert!(!outcome.receipt.runs[0].samples.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_adapter_fails_at_init_without_stopping_the_rest() {
    let server = echo_server().await;
    let outcome = bench(server.uri(), &["reqwest", "netcat"]).await;

    assert_eq!(outcome.report.verdict.status, VerdictStatus::Fail);
    assert_eq!(outcome.report.adapters[0].status, AdapterStatus::Pass);
    match &outcome.receipt.runs[1].outcome {
        RunOutcome::StructuralFailure { stage, reason } => {
            assert_eq!(*stage, FailureStage::Init);
            assert!(reason.contains("netcat"), "{reason}");
        }
        other => panic!("expected init failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_seed_same_workload_across_benches() {
    let server = echo_server().await;
    let a = bench(server.uri(), &["hyper"]).await;
    let b = bench(server.uri(), &["hyper"]).await;
    assert_eq!(a.workload, b.workload);
    assert_ne!(a.receipt.run.id, b.receipt.run.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_is_enforced_per_request() {
    let server = MockServer::start().await;
    Mock::given(path("/status/200"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/get"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;

    let file: ConfigFile = toml::from_str(
        r#"
[bench]
request_count = 4
concurrency = 4
request_timeout = "40ms"
adapters = ["reqwest-unpooled"]

[[endpoint]]
method = "GET"
path = "/get"
"#,
    )
    .unwrap();
    let config = resolve_config(
        &file,
        &ConfigOverrides {
            target: Some(server.uri()),
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = BenchUseCase::new(
        StdAdapterFactory,
        SystemClock,
        StdHostProbe,
        Box::new(std_probe),
        ToolInfo {
            name: "clientbench".to_string(),
            version: "0.0.0-test".to_string(),
        },
    )
    .execute(BenchRequest { config })
    .await
    .unwrap();

    let run = &outcome.receipt.runs[0];
    assert_eq!(run.outcome, RunOutcome::Completed);
    for r in &run.results {
        assert!(!r.is_success());
        assert!(r.elapsed_us < 400_000, "timeout not enforced: {}us", r.elapsed_us);
    }

    let summary = outcome.report.adapters[0].summary.as_ref().unwrap();
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.throughput_per_s, 0.0);
    assert!(summary.latency_ms.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn steady_latency_bounds_throughput_by_concurrency() {
    let server = MockServer::start().await;
    Mock::given(path("/status/200"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(10)))
        .mount(&server)
        .await;

    let config = resolve_config(
        &ConfigFile::default(),
        &ConfigOverrides {
            target: Some(server.uri()),
            request_count: Some(100),
            concurrency: Some(10),
            request_timeout: Some(Duration::from_secs(5)),
            adapters: Some(vec!["hyper".to_string(), "reqwest".to_string()]),
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = BenchUseCase::new(
        StdAdapterFactory,
        SystemClock,
        StdHostProbe,
        Box::new(std_probe),
        ToolInfo {
            name: "clientbench".to_string(),
            version: "0.0.0-test".to_string(),
        },
    )
    .execute(BenchRequest { config })
    .await
    .unwrap();

    assert_eq!(outcome.report.verdict.status, VerdictStatus::Pass);
    for entry in &outcome.report.adapters {
        let s = entry.summary.as_ref().unwrap();
        assert_eq!(s.success_count, 100);
        assert!(s.error_counts.values().all(|&n| n == 0));

        let lat = s.latency_ms.as_ref().unwrap();
        assert!(lat.p99 >= 10.0, "p99 {} below server delay", lat.p99);
        assert!(lat.p99 < 250.0, "p99 {} far above server delay", lat.p99);

        // Ten in flight, each at least 10 ms: at most ~1000 req/s, and
        // close to concurrency / mean latency when the pool keeps up.
        let ideal = 10.0 / (lat.mean / 1000.0);
        assert!(
            s.throughput_per_s >= 0.3 * ideal,
            "throughput {} vs ideal {ideal}",
            s.throughput_per_s
        );
        assert!(s.throughput_per_s <= 1050.0, "throughput {}", s.throughput_per_s);
    }
}
