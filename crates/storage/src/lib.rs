//! Segment registry and membership storage for segmentd.
//!
//! Defines the narrow capability traits the server is wired against and the
//! two implementations:
//! - [`PgStore`]: durable PostgreSQL storage behind an async connection pool
//! - [`MemoryStore`]: volatile storage with the same contract, backing
//!   ephemeral mode and tests
//!
//! Implementations are injected explicitly at startup; nothing in this crate
//! resolves a store ambiently.

#![deny(unsafe_code)]

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use segmentd_types::{MembershipAdd, Result, SegmentId, Slug, UserId};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Creation and deletion of segments.
#[async_trait]
pub trait SegmentRegistry: Send + Sync {
    /// Registers a new segment.
    ///
    /// Fails with [`SegmentError::SegmentExists`](segmentd_types::SegmentError::SegmentExists)
    /// when the slug is already registered.
    async fn add_segment(&self, slug: &Slug) -> Result<SegmentId>;

    /// Deletes a segment and, by cascade, every membership referencing it.
    ///
    /// Fails with [`SegmentError::SegmentNotFound`](segmentd_types::SegmentError::SegmentNotFound)
    /// when no such segment is registered.
    async fn remove_segment(&self, slug: &Slug) -> Result<()>;
}

/// Atomic membership changes and membership reads for one user.
#[async_trait]
pub trait MembershipEngine: Send + Sync {
    /// Applies a batch of membership changes for one user atomically.
    ///
    /// Deletes are processed before adds, each in input order; the first
    /// failure aborts the whole batch. An empty batch is a no-op success that
    /// opens no transaction.
    async fn change_user_segments(
        &self,
        user_id: UserId,
        to_add: &[MembershipAdd],
        to_delete: &[Slug],
    ) -> Result<()>;

    /// Returns the slugs of every segment the user belongs to, ordered by
    /// slug. Expired-but-unswept memberships are included; the sweeper
    /// interval is the staleness bound.
    async fn user_segments(&self, user_id: UserId) -> Result<Vec<Slug>>;
}

/// Bulk removal of expired memberships, driven by the TTL sweeper.
#[async_trait]
pub trait ExpiredPurge: Send + Sync {
    /// Deletes every membership whose expiration is set and `<= now`.
    /// Returns the number of rows removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
