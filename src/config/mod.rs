mod acquisition_config;
mod env_vars;

pub use acquisition_config::{
    AcquisitionConfig,
    MemorySourceConfig,
    ModuleToggles,
    load_or_create_config,
};

pub use env_vars::expand_path;
