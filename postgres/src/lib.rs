//! `PostgreSQL` drawing store for Drawflow.
//!
//! This crate provides the production implementation of the
//! [`DrawingStore`] trait from `drawflow-core`, using sqlx over
//! `PostgreSQL`.
//!
//! # Concurrency contract
//!
//! Both halves of the store contract are implemented together:
//!
//! - the unit of work loads the drawing with `SELECT ... FOR UPDATE`, so two
//!   transitions on the same drawing id never interleave their
//!   read-modify-write (primary mechanism);
//! - the commit runs `UPDATE ... WHERE id = $1 AND version = $expected` and
//!   treats zero affected rows as a concurrency conflict (secondary,
//!   defense-in-depth mechanism against write paths that bypass the lock).
//!
//! The field update and the transition-record insert share one transaction;
//! an error anywhere rolls the whole unit of work back.
//!
//! # Example
//!
//! ```ignore
//! use drawflow_postgres::PostgresDrawingStore;
//!
//! let store = PostgresDrawingStore::connect("postgres://localhost/drawflow").await?;
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use drawflow_core::drawing::{
    ActorId, Drawing, DrawingId, NewDrawing, ProjectId, Revision, TransitionRecord, Version,
};
use drawflow_core::engine::WorkflowError;
use drawflow_core::store::{DecideFn, DrawingStore, StoreError, TransitionOutcome};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;

const DRAWING_COLUMNS: &str = "id, project_id, title, description, author_id, stage, \
     assignee_id, revision, version, drawing_url, created_at, updated_at";

/// `PostgreSQL`-backed drawing store.
///
/// Cheap to clone; wraps a connection pool.
#[derive(Clone)]
pub struct PostgresDrawingStore {
    pool: PgPool,
}

impl PostgresDrawingStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and create a store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!("PostgresDrawingStore connected");
        Ok(Self::from_pool(pool))
    }

    /// Run database migrations (drawings + transition log tables).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Raw row shape of the `drawings` table.
#[derive(Debug, sqlx::FromRow)]
struct DrawingRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    author_id: i64,
    stage: String,
    assignee_id: Option<i64>,
    revision: i32,
    version: i64,
    drawing_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DrawingRow {
    fn into_drawing(self) -> Result<Drawing, StoreError> {
        let stage = self
            .stage
            .parse()
            .map_err(|e| StoreError::Serialization(format!("bad stage column: {e}")))?;
        let revision = u32::try_from(self.revision)
            .map_err(|_| StoreError::Serialization(format!("bad revision: {}", self.revision)))?;
        let version = u64::try_from(self.version)
            .map_err(|_| StoreError::Serialization(format!("bad version: {}", self.version)))?;

        Ok(Drawing {
            id: DrawingId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            title: self.title,
            description: self.description,
            author_id: ActorId::new(self.author_id),
            stage,
            assignee: self.assignee_id.map(ActorId::new),
            revision: Revision::new(revision),
            version: Version::new(version),
            drawing_url: self.drawing_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Raw row shape of the `transition_log` table.
#[derive(Debug, sqlx::FromRow)]
struct TransitionRow {
    id: i64,
    drawing_id: i64,
    actor_id: i64,
    action: String,
    from_stage: String,
    to_stage: String,
    comment: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TransitionRow {
    fn into_record(self) -> Result<TransitionRecord, StoreError> {
        let bad = |what: &str, value: &str| {
            StoreError::Serialization(format!("bad {what} column: {value}"))
        };
        Ok(TransitionRecord {
            id: self.id,
            drawing_id: DrawingId::new(self.drawing_id),
            actor_id: ActorId::new(self.actor_id),
            action: self
                .action
                .parse()
                .map_err(|_| bad("action", &self.action))?,
            from_stage: self
                .from_stage
                .parse()
                .map_err(|_| bad("from_stage", &self.from_stage))?,
            to_stage: self
                .to_stage
                .parse()
                .map_err(|_| bad("to_stage", &self.to_stage))?,
            comment: self.comment,
            timestamp: self.timestamp,
        })
    }
}

fn version_to_db(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Serialization(format!("version out of range: {version}")))
}

fn revision_to_db(revision: Revision) -> Result<i32, StoreError> {
    i32::try_from(revision.value())
        .map_err(|_| StoreError::Serialization(format!("revision out of range: {revision}")))
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl DrawingStore for PostgresDrawingStore {
    fn apply_transition(
        &self,
        id: DrawingId,
        decide: DecideFn,
    ) -> Pin<Box<dyn Future<Output = Result<TransitionOutcome, WorkflowError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| WorkflowError::from(db_err(e)))?;

            // Row-exclusive read: blocks other transitions on this drawing
            // for the duration of the transaction.
            let query = format!("SELECT {DRAWING_COLUMNS} FROM drawings WHERE id = $1 FOR UPDATE");
            let row: Option<DrawingRow> = sqlx::query_as(&query)
                .bind(id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| WorkflowError::from(db_err(e)))?;
            let current = row
                .ok_or(WorkflowError::NotFound)?
                .into_drawing()
                .map_err(WorkflowError::from)?;

            let plan = decide(&current)?;
            let new_version = current.version.next();

            // Version-conditioned write: a mismatch means some write path
            // bypassed the row lock, and the unit of work must fail.
            let updated = sqlx::query(
                "UPDATE drawings
                 SET stage = $2, assignee_id = $3, revision = $4, version = $5, updated_at = now()
                 WHERE id = $1 AND version = $6",
            )
            .bind(id.value())
            .bind(plan.to_stage.as_str())
            .bind(plan.assignee.map(ActorId::value))
            .bind(revision_to_db(plan.revision).map_err(WorkflowError::from)?)
            .bind(version_to_db(new_version).map_err(WorkflowError::from)?)
            .bind(version_to_db(current.version).map_err(WorkflowError::from)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| WorkflowError::from(db_err(e)))?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::ConcurrencyConflict {
                    drawing_id: id,
                    expected: current.version,
                }
                .into());
            }

            let (record_id, timestamp): (i64, DateTime<Utc>) = sqlx::query_as(
                "INSERT INTO transition_log
                     (drawing_id, actor_id, action, from_stage, to_stage, comment)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, timestamp",
            )
            .bind(id.value())
            .bind(plan.actor_id.value())
            .bind(plan.action.as_str())
            .bind(current.stage.as_str())
            .bind(plan.to_stage.as_str())
            .bind(plan.comment.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| WorkflowError::from(db_err(e)))?;

            tx.commit()
                .await
                .map_err(|e| WorkflowError::from(db_err(e)))?;

            let record = TransitionRecord {
                id: record_id,
                drawing_id: id,
                actor_id: plan.actor_id,
                action: plan.action,
                from_stage: current.stage,
                to_stage: plan.to_stage,
                comment: plan.comment,
                timestamp,
            };
            // now() is the transaction timestamp, so updated_at equals the
            // record timestamp written in the same transaction.
            let drawing = Drawing {
                stage: plan.to_stage,
                assignee: plan.assignee,
                revision: plan.revision,
                version: new_version,
                updated_at: timestamp,
                ..current
            };

            Ok(TransitionOutcome { drawing, record })
        })
    }

    fn create(
        &self,
        new: NewDrawing,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO drawings (project_id, title, description, author_id, drawing_url)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {DRAWING_COLUMNS}"
            );
            let row: DrawingRow = sqlx::query_as(&query)
                .bind(new.project_id.value())
                .bind(&new.title)
                .bind(&new.description)
                .bind(new.author_id.value())
                .bind(&new.drawing_url)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            row.into_drawing()
        })
    }

    fn get(
        &self,
        id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Drawing, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let query = format!("SELECT {DRAWING_COLUMNS} FROM drawings WHERE id = $1");
            let row: Option<DrawingRow> = sqlx::query_as(&query)
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            row.ok_or(StoreError::NotFound(id))?.into_drawing()
        })
    }

    fn list_by_project(
        &self,
        project_id: ProjectId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Drawing>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {DRAWING_COLUMNS} FROM drawings WHERE project_id = $1 ORDER BY id"
            );
            let rows: Vec<DrawingRow> = sqlx::query_as(&query)
                .bind(project_id.value())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.into_iter().map(DrawingRow::into_drawing).collect()
        })
    }

    fn transition_log(
        &self,
        drawing_id: DrawingId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TransitionRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<TransitionRow> = sqlx::query_as(
                "SELECT id, drawing_id, actor_id, action, from_stage, to_stage, comment, timestamp
                 FROM transition_log WHERE drawing_id = $1 ORDER BY id",
            )
            .bind(drawing_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.into_iter().map(TransitionRow::into_record).collect()
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code uses expect for clear failure messages
mod tests {
    use super::*;
    use drawflow_core::drawing::Stage;

    fn row() -> DrawingRow {
        DrawingRow {
            id: 1,
            project_id: 2,
            title: "pump skid".to_string(),
            description: String::new(),
            author_id: 3,
            stage: "first_qc".to_string(),
            assignee_id: Some(4),
            revision: 2,
            version: 5,
            drawing_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn drawing_row_maps_to_domain_types() {
        let drawing = row().into_drawing().expect("row should convert");
        assert_eq!(drawing.stage, Stage::FirstQc);
        assert_eq!(drawing.assignee, Some(ActorId::new(4)));
        assert_eq!(drawing.revision, Revision::new(2));
        assert_eq!(drawing.version, Version::new(5));
    }

    #[test]
    fn unknown_stage_string_is_a_serialization_error() {
        let mut bad = row();
        bad.stage = "in_review".to_string();
        assert!(matches!(
            bad.into_drawing(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn negative_version_is_rejected() {
        let mut bad = row();
        bad.version = -1;
        assert!(matches!(
            bad.into_drawing(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn version_round_trips_through_db_type() {
        assert_eq!(version_to_db(Version::new(7)).ok(), Some(7));
        assert!(version_to_db(Version::new(u64::MAX)).is_err());
    }
}
