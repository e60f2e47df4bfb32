#![no_main]

use clientbench_app::{ReportRequest, ReportUseCase};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(receipt) = serde_json::from_slice::<clientbench_types::RunsReceipt>(data) {
        if let Ok(result) = ReportUseCase::execute(ReportRequest { receipt }) {
            let v = &result.report.verdict;
            assert_eq!(
                (v.counts.pass + v.counts.fail) as usize,
                result.report.adapters.len()
            );
        }
    }
});
