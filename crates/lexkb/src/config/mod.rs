pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, load_config, load_config_from_str, load_worker_config, log_level_name,
    validate_config,
};
pub use schema::{
    BlobStoreConfig, ConverterConfig, EmbeddingConfig, ExtractionConfig, GraphConfig, TreeConfig,
    WorkerConfig,
};
