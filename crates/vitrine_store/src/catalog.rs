use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::{MigratorTrait, SchemaManager};

use crate::baseline::purge_stale;
use crate::collection::EntityCollection;
use crate::config::{DatabaseConfig, Limits, VitrineConfig};
use crate::db::*;
use crate::facet::refresh_facets;
use crate::hierarchy::Hierarchies;
use crate::ids::SurrogateIdAllocator;
use crate::migration::{Migrator, secondary_indexes};
use crate::sql::{col_name, exec, query_all, query_one};
use vitrine_core::{
    CatalogApi, CatalogSchemas, EntitySchema, VitrineError, VitrineResult,
};

const STATE_ROW: &str = "catalog";

/// State shared by a catalog and all of its collections.
pub(crate) struct CatalogState {
    pub conn: DatabaseConnection,
    pub limits: Limits,
    pub hierarchies: Hierarchies,
    pub ids: SurrogateIdAllocator,
    pub baseline_owner: String,
    schemas: RwLock<HashMap<String, Arc<EntitySchema>>>,
    live: AtomicBool,
}

impl CatalogState {
    pub fn schema(&self, entity_type: &str) -> VitrineResult<Option<Arc<EntitySchema>>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| VitrineError::storage("schema registry poisoned"))?;
        Ok(schemas.get(entity_type).cloned())
    }

    pub fn schemas(&self) -> VitrineResult<CatalogSchemas> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| VitrineError::storage("schema registry poisoned"))?;
        Ok(CatalogSchemas::new(schemas.clone()))
    }

    fn put_schema(&self, schema: Arc<EntitySchema>) -> VitrineResult<()> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| VitrineError::storage("schema registry poisoned"))?;
        schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Whether the catalog left bulk mode.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

pub struct Catalog {
    state: Arc<CatalogState>,
    collections: RwLock<HashMap<String, Arc<EntityCollection>>>,
}

impl Catalog {
    /// Connects, migrates and restores schemas, lifecycle state and hierarchy indexes.
    pub async fn open(config: &VitrineConfig, base_dir: &Path) -> VitrineResult<Self> {
        let url = connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        options.sqlx_logging(false);
        let conn = Database::connect(options).await?;
        Migrator::up(&conn, None).await?;

        let baseline_owner = config.baseline_owner().to_string();
        let purged = purge_stale(&conn, &baseline_owner).await?;
        if purged > 0 {
            log::warn!("dropped {purged} baseline rows left by an earlier `{baseline_owner}` process");
        }
        let schemas = load_schemas(&conn).await?;
        let live = load_live(&conn).await?;
        let limits = config.limits();
        let hierarchies = Hierarchies::new(limits.section_size, limits.hierarchy_levels);
        for schema in schemas.values().filter(|schema| schema.hierarchical) {
            hierarchies.ensure(&schema.name)?;
        }
        let placements = hierarchies.rebuild(&conn).await?;
        log::info!(
            "catalog opened on {}: {} schemas, {placements} hierarchy placements, live={live}",
            config.backend_name(),
            schemas.len()
        );

        let state = CatalogState {
            ids: SurrogateIdAllocator::new(conn.clone(), limits.flush_threshold, live),
            conn,
            limits,
            baseline_owner,
            hierarchies,
            schemas: RwLock::new(schemas),
            live: AtomicBool::new(live),
        };
        Ok(Self {
            state: Arc::new(state),
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.state.conn
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn ids(&self) -> &SurrogateIdAllocator {
        &self.state.ids
    }

    pub fn limits(&self) -> Limits {
        self.state.limits
    }

    pub fn schemas(&self) -> VitrineResult<CatalogSchemas> {
        self.state.schemas()
    }

    pub fn hierarchies(&self) -> &Hierarchies {
        &self.state.hierarchies
    }

    /// Collection of a type with a stored schema.
    pub fn collection(&self, entity_type: &str) -> VitrineResult<Arc<EntityCollection>> {
        if self.state.schema(entity_type)?.is_none() {
            return Err(VitrineError::not_found(format!(
                "no schema stored for `{entity_type}`"
            )));
        }
        {
            let collections = self
                .collections
                .read()
                .map_err(|_| VitrineError::storage("collection registry poisoned"))?;
            if let Some(collection) = collections.get(entity_type) {
                return Ok(collection.clone());
            }
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|_| VitrineError::storage("collection registry poisoned"))?;
        let collection = collections
            .entry(entity_type.to_string())
            .or_insert_with(|| {
                Arc::new(EntityCollection::new(entity_type, self.state.clone()))
            })
            .clone();
        Ok(collection)
    }

    fn open_collections(&self) -> VitrineResult<Vec<Arc<EntityCollection>>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| VitrineError::storage("collection registry poisoned"))?;
        Ok(collections.values().cloned().collect())
    }

    async fn persist_live(&self, live: bool) -> VitrineResult<()> {
        let insert = Query::insert()
            .into_table(VitrineCatalogState::Table)
            .columns([VitrineCatalogState::Name, VitrineCatalogState::Live])
            .values_panic([STATE_ROW.into(), live.into()])
            .on_conflict(
                OnConflict::column(VitrineCatalogState::Name)
                    .update_column(VitrineCatalogState::Live)
                    .to_owned(),
            )
            .to_owned();
        exec(&self.state.conn, &insert).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogApi for Catalog {
    async fn store_schema(&self, schema: EntitySchema) -> VitrineResult<()> {
        if schema.name.is_empty() {
            return Err(VitrineError::invalid("schema needs an entity type name"));
        }
        let payload = serde_json::to_string(&schema)?;
        let insert = Query::insert()
            .into_table(VitrineSchemas::Table)
            .columns([VitrineSchemas::EntityType, VitrineSchemas::SchemaJson])
            .values_panic([schema.name.clone().into(), payload.into()])
            .on_conflict(
                OnConflict::column(VitrineSchemas::EntityType)
                    .update_column(VitrineSchemas::SchemaJson)
                    .to_owned(),
            )
            .to_owned();
        exec(&self.state.conn, &insert).await?;
        if schema.hierarchical {
            self.state.hierarchies.ensure(&schema.name)?;
        }
        log::info!("schema of `{}` stored", schema.name);
        self.state.put_schema(Arc::new(schema))
    }

    async fn store_serialization_header(
        &self,
        entity_type: &str,
        header: Vec<u8>,
    ) -> VitrineResult<()> {
        let insert = Query::insert()
            .into_table(VitrineSerializationHeaders::Table)
            .columns([
                VitrineSerializationHeaders::EntityType,
                VitrineSerializationHeaders::Header,
            ])
            .values_panic([entity_type.into(), header.into()])
            .on_conflict(
                OnConflict::column(VitrineSerializationHeaders::EntityType)
                    .update_column(VitrineSerializationHeaders::Header)
                    .to_owned(),
            )
            .to_owned();
        exec(&self.state.conn, &insert).await?;
        Ok(())
    }

    async fn load_serialization_header(&self, entity_type: &str) -> VitrineResult<Option<Vec<u8>>> {
        let select = Query::select()
            .column(VitrineSerializationHeaders::Header)
            .from(VitrineSerializationHeaders::Table)
            .and_where(Expr::col(VitrineSerializationHeaders::EntityType).eq(entity_type))
            .to_owned();
        let Some(row) = query_one(&self.state.conn, &select).await? else {
            return Ok(None);
        };
        Ok(Some(
            row.try_get("", &col_name(VitrineSerializationHeaders::Header))?,
        ))
    }

    async fn go_live(&self, restore: bool) -> VitrineResult<()> {
        for collection in self.open_collections()? {
            collection.flush_pending().await?;
        }
        if !restore {
            let manager = SchemaManager::new(&self.state.conn);
            for index in secondary_indexes() {
                manager.create_index(index).await?;
            }
            let entity_types = {
                let schemas = self
                    .state
                    .schemas
                    .read()
                    .map_err(|_| VitrineError::storage("schema registry poisoned"))?;
                schemas.keys().cloned().collect::<Vec<_>>()
            };
            for entity_type in entity_types {
                refresh_facets(&self.state.conn, &entity_type).await?;
            }
        }
        self.state.ids.set_transactional(true).await;
        self.persist_live(true).await?;
        self.state.live.store(true, Ordering::Release);
        log::info!("catalog is live (restore={restore})");
        Ok(())
    }
}

fn connection_url(config: &VitrineConfig, base_dir: &Path) -> VitrineResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
    }
}

async fn load_schemas(conn: &DatabaseConnection) -> VitrineResult<HashMap<String, Arc<EntitySchema>>> {
    let select = Query::select()
        .column(VitrineSchemas::SchemaJson)
        .from(VitrineSchemas::Table)
        .to_owned();
    let mut schemas = HashMap::new();
    for row in query_all(conn, &select).await? {
        let payload: String = row.try_get("", &col_name(VitrineSchemas::SchemaJson))?;
        let schema: EntitySchema = serde_json::from_str(&payload)?;
        schemas.insert(schema.name.clone(), Arc::new(schema));
    }
    Ok(schemas)
}

async fn load_live(conn: &DatabaseConnection) -> VitrineResult<bool> {
    let select = Query::select()
        .column(VitrineCatalogState::Live)
        .from(VitrineCatalogState::Table)
        .and_where(Expr::col(VitrineCatalogState::Name).eq(STATE_ROW))
        .to_owned();
    let Some(row) = query_one(conn, &select).await? else {
        return Ok(false);
    };
    Ok(row.try_get("", &col_name(VitrineCatalogState::Live))?)
}
