use std::sync::Arc;

use cdd_contracts::HttpMethod;
use cdd_core::load_config;
use cdd_driver::DriverRegistry;
use cdd_memory_driver::MemoryDriver;

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/contracts.toml");

#[test]
fn shipped_sample_builds_a_registry() {
    let cfg = load_config(SAMPLE).unwrap();
    let drivers = DriverRegistry::new().with_driver(Arc::new(MemoryDriver::with_policy(
        cfg.storage.content_duplicates.clone(),
    )));
    let registry = cdd_core::bootstrap(&cfg, drivers).unwrap();
    assert_eq!(registry.len(), 5);
    for method in HttpMethod::ALL {
        assert!(registry.get(method, "notes").is_some(), "{method} notes");
    }
}
