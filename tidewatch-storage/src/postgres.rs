//! PostgreSQL persistence gateway.
//!
//! Connection pooling goes through deadpool-postgres. Predicates compile to a
//! single `WHERE` clause over the tier's table, with tree scopes expressed as
//! nested `IN (SELECT id ...)` subqueries on the parent columns, so bulk
//! updates and deletes never pull rows into the process.

use crate::gateway::{
    CascadeJob, LifecycleChange, OpOutcome, Page, PersistenceGateway, PurgePlan, ReferenceCount,
    StateFilter, TierCounts, TierPredicate, TreeScope, WriteBatch, WriteOp,
};
use ::async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime, Transaction};
use std::time::Duration;
use tidewatch_core::{
    Audio, Deletion, Deployment, EntityId, IdentityKey, Point, Project, Record, Recorder,
    StorageError, Tier, TidewatchResult, Timestamp,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{NoTls, Row};
use tracing::instrument;
use uuid::Uuid;

/// DDL for every lifecycle table, safe to run repeatedly.
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tidewatch".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TIDEWATCH_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TIDEWATCH_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("TIDEWATCH_DB_NAME").unwrap_or_else(|_| "tidewatch".to_string()),
            user: std::env::var("TIDEWATCH_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("TIDEWATCH_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TIDEWATCH_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("TIDEWATCH_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> TidewatchResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Pool {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn map_pg_error(err: tokio_postgres::Error) -> StorageError {
    if let Some(db_error) = err.as_db_error() {
        let code = db_error.code();
        if code == &SqlState::UNIQUE_VIOLATION
            || code == &SqlState::FOREIGN_KEY_VIOLATION
            || code == &SqlState::CHECK_VIOLATION
        {
            return StorageError::ConstraintViolation {
                constraint: db_error.constraint().unwrap_or("unknown").to_string(),
                reason: db_error.message().to_string(),
            };
        }
    }
    StorageError::Backend {
        reason: err.to_string(),
    }
}

fn map_pool_error(err: deadpool_postgres::PoolError) -> StorageError {
    StorageError::Pool {
        reason: err.to_string(),
    }
}

// ============================================================================
// SQL BUILDING
// ============================================================================

/// Positional parameters collected while a statement is built.
#[derive(Default)]
struct SqlParams(Vec<Box<dyn ToSql + Sync + Send>>);

impl SqlParams {
    /// Bind a value and return its placeholder.
    fn push<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.0.push(Box::new(value));
        format!("${}", self.0.len())
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn columns(tier: Tier) -> &'static str {
    match tier {
        Tier::Project => {
            "t.id, t.name, t.name_zh, t.area, t.description, t.pending_cascade, \
             t.created_at, t.updated_at, t.deleted_at, t.deleted_by, t.cascade_group"
        }
        Tier::Point => {
            "t.id, t.project_id, t.name, t.gps_lat_plan, t.gps_lon_plan, t.depth_plan, \
             t.description, t.created_at, t.updated_at, t.deleted_at, t.deleted_by, t.cascade_group"
        }
        Tier::Deployment => {
            "t.id, t.point_id, t.recorder_id, t.phase, t.start_time, t.end_time, t.status, \
             t.description, t.created_at, t.updated_at, t.deleted_at, t.deleted_by, t.cascade_group"
        }
        Tier::Audio => {
            "t.id, t.deployment_id, t.file_name, t.object_key, t.file_size, t.record_time, \
             t.meta, t.created_at, t.updated_at, t.deleted_at, t.deleted_by, t.cascade_group"
        }
        Tier::Recorder => {
            "t.id, t.brand, t.model, t.sn, t.sensitivity, t.status, t.description, \
             t.created_at, t.updated_at, t.deleted_at, t.deleted_by, t.cascade_group"
        }
    }
}

/// Tiers walked from just below `ancestor` down to `tier`, inclusive.
fn descendant_path(ancestor: Tier, tier: Tier) -> Result<&'static [Tier], StorageError> {
    let below = ancestor.descendants();
    below
        .iter()
        .position(|t| *t == tier)
        .map(|end| &below[..=end])
        .ok_or_else(|| StorageError::InvalidPredicate {
            reason: format!("{} is not below {}", tier, ancestor),
        })
}

fn parent_column(tier: Tier) -> Result<&'static str, StorageError> {
    tier.parent_column()
        .ok_or_else(|| StorageError::InvalidPredicate {
            reason: format!("{} rows have no parent", tier),
        })
}

fn where_clause(predicate: &TierPredicate, params: &mut SqlParams) -> Result<String, StorageError> {
    predicate.validate()?;
    let scope = match predicate.scope {
        TreeScope::Row(id) => format!("t.id = {}", params.push(id)),
        TreeScope::Under { ancestor, id } => {
            let path = descendant_path(ancestor, predicate.tier)?;
            let mut cond = format!("= {}", params.push(id));
            for level in &path[..path.len() - 1] {
                cond = format!(
                    "IN (SELECT id FROM {} WHERE {} {})",
                    level.table_name(),
                    parent_column(*level)?,
                    cond
                );
            }
            format!("t.{} {}", parent_column(predicate.tier)?, cond)
        }
    };

    let state = match predicate.state {
        StateFilter::Any => None,
        StateFilter::Active => Some("NOT t.is_deleted".to_string()),
        StateFilter::Deleted => Some("t.is_deleted".to_string()),
        StateFilter::DeletedBetween { from, to } => {
            let from = params.push(from);
            let to = params.push(to);
            Some(format!(
                "t.is_deleted AND t.deleted_at BETWEEN {} AND {}",
                from, to
            ))
        }
        StateFilter::DeletedInGroup(group) => Some(format!(
            "t.is_deleted AND t.cascade_group = {}",
            params.push(group)
        )),
    };

    Ok(match state {
        Some(state) => format!("{} AND {}", scope, state),
        None => scope,
    })
}

fn key_condition(key: &IdentityKey, params: &mut SqlParams) -> String {
    match key {
        IdentityKey::ProjectName { name } => format!("t.name = {}", params.push(name.clone())),
        IdentityKey::ProjectLocalizedName { name_zh } => {
            format!("t.name_zh = {}", params.push(name_zh.clone()))
        }
        IdentityKey::PointName { project_id, name } => {
            let project = params.push(*project_id);
            let name = params.push(name.clone());
            format!("t.project_id = {} AND t.name = {}", project, name)
        }
        IdentityKey::DeploymentPhase { point_id, phase } => {
            let point = params.push(*point_id);
            let phase = params.push(*phase);
            format!("t.point_id = {} AND t.phase = {}", point, phase)
        }
        IdentityKey::AudioObjectKey { object_key } => {
            format!("t.object_key = {}", params.push(object_key.clone()))
        }
        IdentityKey::RecorderSerial {
            brand,
            model,
            serial,
        } => {
            let brand = params.push(brand.clone());
            let model = params.push(model.clone());
            let serial = params.push(serial.clone());
            format!(
                "t.brand = {} AND t.model = {} AND t.sn = {}",
                brand, model, serial
            )
        }
    }
}

/// Revival guard: no other active row holds any of `t`'s keys.
fn key_guard(tier: Tier) -> &'static str {
    match tier {
        Tier::Project => {
            "NOT EXISTS (SELECT 1 FROM project_info o WHERE NOT o.is_deleted AND o.id <> t.id \
             AND (o.name = t.name OR (t.name_zh IS NOT NULL AND o.name_zh = t.name_zh)))"
        }
        Tier::Point => {
            "NOT EXISTS (SELECT 1 FROM point_info o WHERE NOT o.is_deleted AND o.id <> t.id \
             AND o.project_id = t.project_id AND o.name = t.name)"
        }
        Tier::Deployment => {
            "NOT EXISTS (SELECT 1 FROM deployment_info o WHERE NOT o.is_deleted AND o.id <> t.id \
             AND o.point_id = t.point_id AND o.phase = t.phase)"
        }
        Tier::Audio => {
            "NOT EXISTS (SELECT 1 FROM audio_info o WHERE NOT o.is_deleted AND o.id <> t.id \
             AND o.object_key = t.object_key)"
        }
        Tier::Recorder => {
            "NOT EXISTS (SELECT 1 FROM recorder_info o WHERE NOT o.is_deleted AND o.id <> t.id \
             AND o.brand = t.brand AND o.model = t.model AND o.sn = t.sn)"
        }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, StorageError> {
    row.try_get(name).map_err(|e| StorageError::Backend {
        reason: format!("column {}: {}", name, e),
    })
}

fn deletion_from(row: &Row) -> Result<Option<Deletion>, StorageError> {
    let deleted_at: Option<Timestamp> = column(row, "deleted_at")?;
    let deleted_by: Option<Uuid> = column(row, "deleted_by")?;
    let cascade_group: Option<Uuid> = column(row, "cascade_group")?;
    Ok(match (deleted_at, deleted_by, cascade_group) {
        (Some(deleted_at), Some(deleted_by), Some(cascade_group)) => Some(Deletion {
            deleted_at,
            deleted_by,
            cascade_group,
        }),
        _ => None,
    })
}

fn parse_status<T: std::str::FromStr<Err = String>>(raw: String) -> Result<T, StorageError> {
    raw.parse()
        .map_err(|reason: String| StorageError::Backend { reason })
}

fn project_from(row: &Row) -> Result<Project, StorageError> {
    Ok(Project {
        id: column(row, "id")?,
        name: column(row, "name")?,
        name_zh: column(row, "name_zh")?,
        area: column(row, "area")?,
        description: column(row, "description")?,
        pending_cascade: column(row, "pending_cascade")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deletion: deletion_from(row)?,
    })
}

fn record_from(tier: Tier, row: &Row) -> Result<Record, StorageError> {
    Ok(match tier {
        Tier::Project => Record::Project(project_from(row)?),
        Tier::Point => Record::Point(Point {
            id: column(row, "id")?,
            project_id: column(row, "project_id")?,
            name: column(row, "name")?,
            gps_lat_plan: column(row, "gps_lat_plan")?,
            gps_lon_plan: column(row, "gps_lon_plan")?,
            depth_plan: column(row, "depth_plan")?,
            description: column(row, "description")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
            deletion: deletion_from(row)?,
        }),
        Tier::Deployment => Record::Deployment(Deployment {
            id: column(row, "id")?,
            point_id: column(row, "point_id")?,
            recorder_id: column(row, "recorder_id")?,
            phase: column(row, "phase")?,
            start_time: column(row, "start_time")?,
            end_time: column(row, "end_time")?,
            status: parse_status(column(row, "status")?)?,
            description: column(row, "description")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
            deletion: deletion_from(row)?,
        }),
        Tier::Audio => Record::Audio(Audio {
            id: column(row, "id")?,
            deployment_id: column(row, "deployment_id")?,
            file_name: column(row, "file_name")?,
            object_key: column(row, "object_key")?,
            file_size: column(row, "file_size")?,
            record_time: column(row, "record_time")?,
            meta: column(row, "meta")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
            deletion: deletion_from(row)?,
        }),
        Tier::Recorder => Record::Recorder(Recorder {
            id: column(row, "id")?,
            brand: column(row, "brand")?,
            model: column(row, "model")?,
            serial: column(row, "sn")?,
            sensitivity: column(row, "sensitivity")?,
            status: parse_status(column(row, "status")?)?,
            description: column(row, "description")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
            deletion: deletion_from(row)?,
        }),
    })
}

fn job_from(row: &Row) -> Result<CascadeJob, StorageError> {
    Ok(CascadeJob {
        id: column(row, "id")?,
        project_id: column(row, "project_id")?,
        deletion: Deletion {
            deleted_at: column(row, "deleted_at")?,
            deleted_by: column(row, "deleted_by")?,
            cascade_group: column(row, "cascade_group")?,
        },
        enqueued_at: column(row, "enqueued_at")?,
    })
}

// ============================================================================
// TRANSACTIONAL HELPERS
// ============================================================================

async fn apply_update(
    tx: &Transaction<'_>,
    predicate: &TierPredicate,
    change: LifecycleChange,
) -> Result<OpOutcome, StorageError> {
    let table = predicate.tier.table_name();
    let mut params = SqlParams::default();
    let filter = where_clause(predicate, &mut params)?;

    match change {
        LifecycleChange::Tombstone(deletion) => {
            let at = params.push(deletion.deleted_at);
            let by = params.push(deletion.deleted_by);
            let group = params.push(deletion.cascade_group);
            let sql = format!(
                "UPDATE {table} AS t SET is_deleted = TRUE, deleted_at = {at}, deleted_by = {by}, \
                 cascade_group = {group}, updated_at = {at} WHERE {filter} AND NOT t.is_deleted"
            );
            let affected = tx
                .execute(sql.as_str(), &params.refs())
                .await
                .map_err(map_pg_error)?;
            Ok(OpOutcome {
                affected,
                skipped: 0,
            })
        }
        LifecycleChange::Revive => {
            let count_sql =
                format!("SELECT COUNT(*) FROM {table} AS t WHERE {filter} AND t.is_deleted");
            let row = tx
                .query_one(count_sql.as_str(), &params.refs())
                .await
                .map_err(map_pg_error)?;
            let candidates: i64 = column(&row, "count")?;

            let sql = format!(
                "UPDATE {table} AS t SET is_deleted = FALSE, deleted_at = NULL, deleted_by = NULL, \
                 cascade_group = NULL WHERE {filter} AND t.is_deleted AND {guard}",
                guard = key_guard(predicate.tier)
            );
            let affected = tx
                .execute(sql.as_str(), &params.refs())
                .await
                .map_err(map_pg_error)?;
            Ok(OpOutcome {
                affected,
                skipped: (candidates as u64).saturating_sub(affected),
            })
        }
    }
}

async fn enqueue(tx: &Transaction<'_>, job: &CascadeJob) -> Result<OpOutcome, StorageError> {
    tx.execute(
        "INSERT INTO cascade_job (id, project_id, deleted_at, deleted_by, cascade_group, enqueued_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        &[
            &job.id,
            &job.project_id,
            &job.deletion.deleted_at,
            &job.deletion.deleted_by,
            &job.deletion.cascade_group,
            &job.enqueued_at,
        ],
    )
    .await
    .map_err(map_pg_error)?;
    tx.execute(
        "UPDATE project_info SET pending_cascade = TRUE WHERE id = $1",
        &[&job.project_id],
    )
    .await
    .map_err(map_pg_error)?;
    Ok(OpOutcome {
        affected: 1,
        skipped: 0,
    })
}

async fn complete(tx: &Transaction<'_>, job_id: EntityId) -> Result<OpOutcome, StorageError> {
    let row = tx
        .query_opt(
            "DELETE FROM cascade_job WHERE id = $1 RETURNING project_id",
            &[&job_id],
        )
        .await
        .map_err(map_pg_error)?
        .ok_or(StorageError::CascadeJobMissing { job_id })?;
    let project_id: Uuid = column(&row, "project_id")?;
    tx.execute(
        "UPDATE project_info SET pending_cascade = \
         EXISTS (SELECT 1 FROM cascade_job j WHERE j.project_id = $1) WHERE id = $1",
        &[&project_id],
    )
    .await
    .map_err(map_pg_error)?;
    Ok(OpOutcome {
        affected: 1,
        skipped: 0,
    })
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Gateway backed by a deadpool-postgres connection pool.
#[derive(Clone)]
pub struct PgGateway {
    pool: Pool,
}

impl std::fmt::Debug for PgGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgGateway")
            .field("pool_size", &self.pool_size())
            .finish_non_exhaustive()
    }
}

impl PgGateway {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> TidewatchResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(map_pool_error)
    }

    /// Create the lifecycle tables and indexes if they are missing.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> TidewatchResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(map_pg_error)?;
        tracing::info!("Lifecycle schema applied");
        Ok(())
    }

    async fn find(&self, tier: Tier, id: EntityId, active_only: bool) -> TidewatchResult<Option<Record>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM {} AS t WHERE t.id = $1{}",
            columns(tier),
            tier.table_name(),
            if active_only { " AND NOT t.is_deleted" } else { "" }
        );
        let row = conn
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(map_pg_error)?;
        Ok(row.map(|r| record_from(tier, &r)).transpose()?)
    }

    async fn key_exists(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
        deleted: bool,
    ) -> TidewatchResult<bool> {
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let cond = key_condition(key, &mut params);
        let state = if deleted { "t.is_deleted" } else { "NOT t.is_deleted" };
        let exclude = match exclude {
            Some(id) => format!(" AND t.id <> {}", params.push(id)),
            None => String::new(),
        };
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} AS t WHERE {} AND {}{}) AS held",
            key.tier().table_name(),
            cond,
            state,
            exclude
        );
        let row = conn
            .query_one(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        Ok(column(&row, "held")?)
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    #[instrument(skip(self, record), fields(tier = %record.tier(), id = %record.id()))]
    async fn insert(&self, record: &Record) -> TidewatchResult<()> {
        let conn = self.get_conn().await?;
        let deletion = record.deletion().copied();
        let is_deleted = deletion.is_some();
        let deleted_at = deletion.map(|d| d.deleted_at);
        let deleted_by = deletion.map(|d| d.deleted_by);
        let cascade_group = deletion.map(|d| d.cascade_group);

        let result = match record {
            Record::Project(p) => {
                conn.execute(
                    "INSERT INTO project_info (id, name, name_zh, area, description, pending_cascade, \
                     created_at, updated_at, is_deleted, deleted_at, deleted_by, cascade_group) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                    &[
                        &p.id,
                        &p.name,
                        &p.name_zh,
                        &p.area,
                        &p.description,
                        &p.pending_cascade,
                        &p.created_at,
                        &p.updated_at,
                        &is_deleted,
                        &deleted_at,
                        &deleted_by,
                        &cascade_group,
                    ],
                )
                .await
            }
            Record::Point(p) => {
                conn.execute(
                    "INSERT INTO point_info (id, project_id, name, gps_lat_plan, gps_lon_plan, depth_plan, \
                     description, created_at, updated_at, is_deleted, deleted_at, deleted_by, cascade_group) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                    &[
                        &p.id,
                        &p.project_id,
                        &p.name,
                        &p.gps_lat_plan,
                        &p.gps_lon_plan,
                        &p.depth_plan,
                        &p.description,
                        &p.created_at,
                        &p.updated_at,
                        &is_deleted,
                        &deleted_at,
                        &deleted_by,
                        &cascade_group,
                    ],
                )
                .await
            }
            Record::Deployment(d) => {
                let status = d.status.as_db_str();
                conn.execute(
                    "INSERT INTO deployment_info (id, point_id, recorder_id, phase, start_time, end_time, \
                     status, description, created_at, updated_at, is_deleted, deleted_at, deleted_by, \
                     cascade_group) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
                    &[
                        &d.id,
                        &d.point_id,
                        &d.recorder_id,
                        &d.phase,
                        &d.start_time,
                        &d.end_time,
                        &status,
                        &d.description,
                        &d.created_at,
                        &d.updated_at,
                        &is_deleted,
                        &deleted_at,
                        &deleted_by,
                        &cascade_group,
                    ],
                )
                .await
            }
            Record::Audio(a) => {
                conn.execute(
                    "INSERT INTO audio_info (id, deployment_id, file_name, object_key, file_size, \
                     record_time, meta, created_at, updated_at, is_deleted, deleted_at, deleted_by, \
                     cascade_group) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                    &[
                        &a.id,
                        &a.deployment_id,
                        &a.file_name,
                        &a.object_key,
                        &a.file_size,
                        &a.record_time,
                        &a.meta,
                        &a.created_at,
                        &a.updated_at,
                        &is_deleted,
                        &deleted_at,
                        &deleted_by,
                        &cascade_group,
                    ],
                )
                .await
            }
            Record::Recorder(r) => {
                let status = r.status.as_db_str();
                conn.execute(
                    "INSERT INTO recorder_info (id, brand, model, sn, sensitivity, status, description, \
                     created_at, updated_at, is_deleted, deleted_at, deleted_by, cascade_group) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                    &[
                        &r.id,
                        &r.brand,
                        &r.model,
                        &r.serial,
                        &r.sensitivity,
                        &status,
                        &r.description,
                        &r.created_at,
                        &r.updated_at,
                        &is_deleted,
                        &deleted_at,
                        &deleted_by,
                        &cascade_group,
                    ],
                )
                .await
            }
        };
        result.map_err(map_pg_error)?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(tier = %record.tier(), id = %record.id()))]
    async fn replace(&self, record: &Record) -> TidewatchResult<()> {
        let conn = self.get_conn().await?;
        let result = match record {
            Record::Project(p) => {
                conn.execute(
                    "UPDATE project_info SET name = $2, name_zh = $3, area = $4, description = $5, \
                     updated_at = $6 WHERE id = $1",
                    &[
                        &p.id,
                        &p.name,
                        &p.name_zh,
                        &p.area,
                        &p.description,
                        &p.updated_at,
                    ],
                )
                .await
            }
            Record::Point(p) => {
                conn.execute(
                    "UPDATE point_info SET name = $2, gps_lat_plan = $3, gps_lon_plan = $4, \
                     depth_plan = $5, description = $6, updated_at = $7 WHERE id = $1",
                    &[
                        &p.id,
                        &p.name,
                        &p.gps_lat_plan,
                        &p.gps_lon_plan,
                        &p.depth_plan,
                        &p.description,
                        &p.updated_at,
                    ],
                )
                .await
            }
            Record::Deployment(d) => {
                let status = d.status.as_db_str();
                conn.execute(
                    "UPDATE deployment_info SET start_time = $2, end_time = $3, status = $4, \
                     description = $5, updated_at = $6 WHERE id = $1",
                    &[
                        &d.id,
                        &d.start_time,
                        &d.end_time,
                        &status,
                        &d.description,
                        &d.updated_at,
                    ],
                )
                .await
            }
            Record::Audio(a) => {
                conn.execute(
                    "UPDATE audio_info SET file_name = $2, object_key = $3, file_size = $4, \
                     record_time = $5, meta = $6, updated_at = $7 WHERE id = $1",
                    &[
                        &a.id,
                        &a.file_name,
                        &a.object_key,
                        &a.file_size,
                        &a.record_time,
                        &a.meta,
                        &a.updated_at,
                    ],
                )
                .await
            }
            Record::Recorder(r) => {
                let status = r.status.as_db_str();
                conn.execute(
                    "UPDATE recorder_info SET brand = $2, model = $3, sn = $4, sensitivity = $5, \
                     status = $6, description = $7, updated_at = $8 WHERE id = $1",
                    &[
                        &r.id,
                        &r.brand,
                        &r.model,
                        &r.serial,
                        &r.sensitivity,
                        &status,
                        &r.description,
                        &r.updated_at,
                    ],
                )
                .await
            }
        };
        let updated = result.map_err(map_pg_error)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                tier: record.tier(),
                id: record.id(),
            }
            .into());
        }
        Ok(())
    }

    async fn find_active(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>> {
        self.find(tier, id, true).await
    }

    async fn find_any(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>> {
        self.find(tier, id, false).await
    }

    async fn list_active(
        &self,
        tier: Tier,
        parent: Option<EntityId>,
        page: Page,
    ) -> TidewatchResult<Vec<Record>> {
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let mut filter = "NOT t.is_deleted".to_string();
        if let Some(parent_id) = parent {
            let col = parent_column(tier)?;
            filter.push_str(&format!(" AND t.{} = {}", col, params.push(parent_id)));
        }
        let limit = params.push(i64::from(page.limit));
        let offset = params.push(page.offset as i64);
        let sql = format!(
            "SELECT {} FROM {} AS t WHERE {} ORDER BY t.id LIMIT {} OFFSET {}",
            columns(tier),
            tier.table_name(),
            filter,
            limit,
            offset
        );
        let rows = conn
            .query(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        Ok(rows
            .iter()
            .map(|r| record_from(tier, r))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn exists_active(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool> {
        self.key_exists(key, exclude, false).await
    }

    async fn exists_deleted(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool> {
        self.key_exists(key, exclude, true).await
    }

    async fn max_active_phase(&self, point_id: EntityId) -> TidewatchResult<Option<i32>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT MAX(phase) AS phase FROM deployment_info \
                 WHERE point_id = $1 AND NOT is_deleted",
                &[&point_id],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(column(&row, "phase")?)
    }

    async fn count(&self, predicate: &TierPredicate) -> TidewatchResult<u64> {
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let filter = where_clause(predicate, &mut params)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} AS t WHERE {}",
            predicate.tier.table_name(),
            filter
        );
        let row = conn
            .query_one(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        let count: i64 = column(&row, "count")?;
        Ok(count as u64)
    }

    async fn collect_ids(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<EntityId>> {
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let filter = where_clause(predicate, &mut params)?;
        let sql = format!(
            "SELECT t.id FROM {} AS t WHERE {} ORDER BY t.id",
            predicate.tier.table_name(),
            filter
        );
        let rows = conn
            .query(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        Ok(rows
            .iter()
            .map(|r| column(r, "id"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn object_keys(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<String>> {
        if predicate.tier != Tier::Audio {
            return Err(StorageError::InvalidPredicate {
                reason: format!("{} rows carry no object keys", predicate.tier),
            }
            .into());
        }
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let filter = where_clause(predicate, &mut params)?;
        let sql = format!(
            "SELECT t.object_key FROM audio_info AS t WHERE {} ORDER BY t.id",
            filter
        );
        let rows = conn
            .query(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        Ok(rows
            .iter()
            .map(|r| column(r, "object_key"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn owning_project(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Project>> {
        if tier == Tier::Recorder {
            return Ok(None);
        }
        let conn = self.get_conn().await?;
        let mut params = SqlParams::default();
        let mut expr = params.push(id);
        let mut current = tier;
        while let (Some(parent), Some(col)) = (current.parent(), current.parent_column()) {
            expr = format!(
                "(SELECT {} FROM {} WHERE id = {})",
                col,
                current.table_name(),
                expr
            );
            current = parent;
        }
        let sql = format!(
            "SELECT {} FROM project_info AS t WHERE t.id = {}",
            columns(Tier::Project),
            expr
        );
        let row = conn
            .query_opt(sql.as_str(), &params.refs())
            .await
            .map_err(map_pg_error)?;
        Ok(row.map(|r| project_from(&r)).transpose()?)
    }

    async fn recorder_references(&self, recorder_id: EntityId) -> TidewatchResult<ReferenceCount> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FILTER (WHERE NOT is_deleted) AS active, \
                 COUNT(*) FILTER (WHERE is_deleted) AS tombstoned \
                 FROM deployment_info WHERE recorder_id = $1",
                &[&recorder_id],
            )
            .await
            .map_err(map_pg_error)?;
        let active: i64 = column(&row, "active")?;
        let tombstoned: i64 = column(&row, "tombstoned")?;
        Ok(ReferenceCount {
            active: active as u64,
            tombstoned: tombstoned as u64,
        })
    }

    #[instrument(skip(self, batch), fields(ops = batch.len()))]
    async fn apply(&self, batch: &WriteBatch) -> TidewatchResult<Vec<OpOutcome>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(map_pg_error)?;
        let mut outcomes = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            let outcome = match op {
                WriteOp::Update { predicate, change } => apply_update(&tx, predicate, *change).await?,
                WriteOp::EnqueueCascade(job) => enqueue(&tx, job).await?,
                WriteOp::CompleteCascade { job_id } => complete(&tx, *job_id).await?,
            };
            outcomes.push(outcome);
        }
        tx.commit().await.map_err(map_pg_error)?;
        Ok(outcomes)
    }

    #[instrument(skip(self, plan), fields(steps = plan.steps().len()))]
    async fn purge(&self, plan: &PurgePlan) -> TidewatchResult<TierCounts> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(map_pg_error)?;
        let mut counts = TierCounts::default();
        for step in plan.steps() {
            let mut params = SqlParams::default();
            let filter = where_clause(step, &mut params)?;
            let sql = format!(
                "DELETE FROM {} AS t WHERE {}",
                step.tier.table_name(),
                filter
            );
            let removed = tx
                .execute(sql.as_str(), &params.refs())
                .await
                .map_err(map_pg_error)?;
            counts.add(step.tier, removed);
        }
        tx.commit().await.map_err(map_pg_error)?;
        Ok(counts)
    }

    async fn pending_cascades(&self, limit: usize) -> TidewatchResult<Vec<CascadeJob>> {
        let conn = self.get_conn().await?;
        let limit = limit as i64;
        let rows = conn
            .query(
                "SELECT id, project_id, deleted_at, deleted_by, cascade_group, enqueued_at \
                 FROM cascade_job ORDER BY enqueued_at, id LIMIT $1",
                &[&limit],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(rows.iter().map(job_from).collect::<Result<Vec<_>, _>>()?)
    }

    async fn pending_cascades_for(&self, project_id: EntityId) -> TidewatchResult<Vec<CascadeJob>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, project_id, deleted_at, deleted_by, cascade_group, enqueued_at \
                 FROM cascade_job WHERE project_id = $1 ORDER BY enqueued_at, id",
                &[&project_id],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(rows.iter().map(job_from).collect::<Result<Vec<_>, _>>()?)
    }

    async fn health_check(&self) -> TidewatchResult<bool> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(map_pg_error)?;
        Ok(true)
    }
}
