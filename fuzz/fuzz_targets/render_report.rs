#![no_main]

use clientbench_app::{ExportFormat, ExportUseCase, github_annotations, render_markdown, render_table};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(report) = serde_json::from_slice::<clientbench_types::BenchReport>(data) {
        let _ = render_table(&report);
        let _ = render_markdown(&report);
        let _ = github_annotations(&report);
        let _ = ExportUseCase::export(&report, ExportFormat::Csv);
        let _ = ExportUseCase::export(&report, ExportFormat::Jsonl);
    }
});
