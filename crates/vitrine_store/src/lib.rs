pub mod baseline;
mod buffer;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod datastore;
mod db;
mod facet;
mod filter;
pub mod hierarchy;
mod histogram;
pub mod ids;
pub mod migration;
mod sql;
mod upsert;

pub mod api {
    pub use vitrine_core::api::*;
}

pub mod request {
    pub use vitrine_core::request::*;
}

pub mod response {
    pub use vitrine_core::response::*;
}

pub use baseline::BaselineContext;
pub use catalog::Catalog;
pub use collection::EntityCollection;
pub use config::{
    DatabaseConfig, HierarchyConfig, Limits, PoolConfig, QueryConfig, VitrineConfig, WriteConfig,
};
pub use datastore::{default_sqlite_path, load_or_init_config, open_catalog};
pub use hierarchy::Hierarchies;
pub use ids::SurrogateIdAllocator;
pub use vitrine_core::*;
