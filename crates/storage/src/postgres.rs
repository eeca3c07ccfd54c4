//! PostgreSQL storage backend.
//!
//! Implements the registry, the membership transaction engine, and the
//! expired-membership purge on top of `sqlx::PgPool`. The schema is
//! bootstrapped at connect time, which doubles as the startup connectivity
//! check.
//!
//! Error mapping follows the PostgreSQL error codes: unique-constraint
//! violations become `SegmentExists`/`AlreadyMember` and foreign-key
//! violations become `SegmentNotFound`; everything else is a storage error
//! whose detail reaches only the log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::ensure;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use segmentd_types::config::PostgresConfig;
use segmentd_types::error::{AlreadyMemberSnafu, SegmentNotFoundSnafu, StorageSnafu};
use segmentd_types::{MembershipAdd, Result, SegmentError, SegmentId, Slug, UserId};

use crate::{ExpiredPurge, MembershipEngine, SegmentRegistry};

/// PostgreSQL class 23 codes the engine translates into domain errors.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

const CREATE_SEGMENTS: &str = "\
CREATE TABLE IF NOT EXISTS segments(
    id BIGSERIAL PRIMARY KEY,
    slug VARCHAR(64) UNIQUE NOT NULL)";

// The UNIQUE (user_id, slug) constraint is the authoritative guard against
// concurrent duplicate adds; the in-transaction existence check only exists
// to produce the friendlier AlreadyMember message.
const CREATE_USER_SEGMENTS: &str = "\
CREATE TABLE IF NOT EXISTS user_segments(
    user_id BIGINT NOT NULL,
    slug VARCHAR(64) NOT NULL REFERENCES segments(slug) ON DELETE CASCADE,
    expiration_date TIMESTAMPTZ,
    UNIQUE (user_id, slug))";

/// Durable store backed by a pooled PostgreSQL connection set.
///
/// One pool is shared by all request workers and the sweeper; mutual
/// exclusion is delegated entirely to the database's transactional
/// guarantees.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to PostgreSQL and bootstraps the schema.
    ///
    /// Creating the tables on the fresh pool also serves as the startup
    /// ping: an unreachable or misconfigured database fails here, before the
    /// server starts accepting requests.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_url())
            .await
            .map_err(storage_error)?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(
            host = %config.host,
            dbname = %config.dbname,
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(store)
    }

    /// Wraps an existing pool; the caller is responsible for the schema.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_SEGMENTS).execute(&self.pool).await.map_err(storage_error)?;
        sqlx::query(CREATE_USER_SEGMENTS).execute(&self.pool).await.map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl SegmentRegistry for PgStore {
    async fn add_segment(&self, slug: &Slug) -> Result<SegmentId> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO segments(slug) VALUES($1) RETURNING id")
            .bind(slug.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match db_error_code(&err).as_deref() {
                Some(PG_UNIQUE_VIOLATION) => SegmentError::SegmentExists { slug: slug.clone() },
                _ => storage_error(err),
            })?;
        Ok(SegmentId::new(id))
    }

    async fn remove_segment(&self, slug: &Slug) -> Result<()> {
        let result = sqlx::query("DELETE FROM segments WHERE slug=$1")
            .bind(slug.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        ensure!(result.rows_affected() > 0, SegmentNotFoundSnafu { slug: slug.clone() });
        Ok(())
    }
}

#[async_trait]
impl MembershipEngine for PgStore {
    async fn change_user_segments(
        &self,
        user_id: UserId,
        to_add: &[MembershipAdd],
        to_delete: &[Slug],
    ) -> Result<()> {
        if to_add.is_empty() && to_delete.is_empty() {
            return Ok(());
        }

        // A failed batch returns early with `?`; dropping the transaction
        // rolls it back, so no partial application can commit.
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for slug in to_delete {
            let segment = sqlx::query_scalar::<_, i64>("SELECT id FROM segments WHERE slug=$1")
                .bind(slug.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;
            ensure!(segment.is_some(), SegmentNotFoundSnafu { slug: slug.clone() });

            // Membership delete is idempotent: zero rows affected is fine.
            sqlx::query("DELETE FROM user_segments WHERE user_id=$1 AND slug=$2")
                .bind(user_id.value())
                .bind(slug.as_str())
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        for entry in to_add {
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM user_segments WHERE user_id=$1 AND slug=$2",
            )
            .bind(user_id.value())
            .bind(entry.slug.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;
            ensure!(
                existing == 0,
                AlreadyMemberSnafu { user_id, slug: entry.slug.clone() }
            );

            sqlx::query(
                "INSERT INTO user_segments(user_id, slug, expiration_date) VALUES($1, $2, $3)",
            )
            .bind(user_id.value())
            .bind(entry.slug.as_str())
            .bind(entry.expiration_date)
            .execute(&mut *tx)
            .await
            .map_err(|err| match db_error_code(&err).as_deref() {
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    SegmentError::SegmentNotFound { slug: entry.slug.clone() }
                }
                Some(PG_UNIQUE_VIOLATION) => {
                    SegmentError::AlreadyMember { user_id, slug: entry.slug.clone() }
                }
                _ => storage_error(err),
            })?;
        }

        tx.commit().await.map_err(storage_error)
    }

    async fn user_segments(&self, user_id: UserId) -> Result<Vec<Slug>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM user_segments WHERE user_id=$1 ORDER BY slug",
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        // The column constraint keeps every stored slug valid.
        raw.into_iter().map(Slug::parse).collect()
    }
}

#[async_trait]
impl ExpiredPurge for PgStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM user_segments WHERE expiration_date IS NOT NULL AND expiration_date <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}

/// Extracts the SQLSTATE code from a database-level error, if any.
fn db_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

#[track_caller]
fn storage_error(err: sqlx::Error) -> SegmentError {
    StorageSnafu { message: err.to_string() }.build()
}
