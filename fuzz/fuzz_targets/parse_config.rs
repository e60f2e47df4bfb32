#![no_main]

use clientbench_app::{ConfigOverrides, resolve_config};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(file) = toml::from_str::<clientbench_types::ConfigFile>(s) {
            // Validation must reject bad input with an error, never a panic.
            let _ = resolve_config(&file, &ConfigOverrides::default());
        }
    }
});
