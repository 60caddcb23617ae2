//! Contract processing core: wraps contracts into operations, groups them in a method
//! registry, and loads the declarative configuration they are built from.

pub mod catalog;
pub mod config;
pub mod processor;
pub mod registry;

use std::sync::Arc;

use cdd_driver::DriverRegistry;
use cdd_policy::PolicyEngine;

pub use catalog::{Catalog, CatalogError, ContractManifest};
pub use config::{config_schema_json, load_config, parse_config, Config, PipelineConfig};
pub use processor::{wrap, Operation, WrapOptions};
pub use registry::{MethodRegistry, MethodRegistryBuilder, RegistryError};

/// Build the shared registry for every contract declared in `cfg`.
pub fn bootstrap(
    cfg: &Config,
    drivers: DriverRegistry,
) -> Result<Arc<MethodRegistry>, CatalogError> {
    let catalog = Catalog::new(drivers)
        .with_policy(PolicyEngine::with_config(cfg.authorization.clone()))
        .with_pipeline(cfg.pipeline);
    catalog.build(&cfg.contracts).map(Arc::new)
}
