pub mod config;
pub mod entity;

pub use config::{
    load_config, AppConfig, ConcurrencyConfig, DatabaseConfig, ExportConfig, FileConfig,
    SiteConfig,
};
pub use entity::{EntityMap, EntityType, DELETED_LEGACY_ID};
