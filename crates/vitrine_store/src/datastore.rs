use std::path::{Path, PathBuf};

use crate::{Catalog, VitrineConfig};
use vitrine_core::VitrineResult;

const DEFAULT_DB_NAME: &str = "catalog.sqlite";

pub fn load_or_init_config(base: &Path) -> VitrineResult<VitrineConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    VitrineConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_catalog(base: &Path) -> VitrineResult<Catalog> {
    let config = load_or_init_config(base)?;
    Catalog::open(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
