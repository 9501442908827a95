#![no_main]

use libfuzzer_sys::fuzz_target;
use rill_fuzz::FuzzScenario;

fuzz_target!(|scenario: FuzzScenario| {
    if let Err(divergence) = scenario.run() {
        panic!("source diverged from model: {divergence}");
    }
});
