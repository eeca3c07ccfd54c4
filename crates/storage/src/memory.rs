//! Volatile in-memory storage backend.
//!
//! Backs ephemeral mode (no `postgres` section configured) and the test
//! suites. The contract is identical to [`PgStore`](crate::PgStore):
//! duplicate memberships are rejected, segment deletion cascades, and a
//! membership batch applies all-or-nothing. Batch atomicity is preserved by
//! validating the whole batch under one write lock before mutating anything.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use snafu::ensure;

use segmentd_types::error::{AlreadyMemberSnafu, SegmentExistsSnafu, SegmentNotFoundSnafu};
use segmentd_types::{MembershipAdd, Result, SegmentId, Slug, UserId};

use crate::{ExpiredPurge, MembershipEngine, SegmentRegistry};

#[derive(Debug, Default)]
struct Inner {
    next_segment_id: i64,
    segments: HashMap<Slug, SegmentId>,
    /// Keyed by (user, slug); the BTreeMap keeps per-user reads slug-ordered.
    memberships: BTreeMap<(UserId, Slug), Option<DateTime<Utc>>>,
}

/// In-memory store with the same contract as the PostgreSQL backend.
///
/// All data is lost on shutdown; the server warns at startup when running
/// against it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memberships currently held, expired or not.
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.inner.read().memberships.len()
    }
}

#[async_trait]
impl SegmentRegistry for MemoryStore {
    async fn add_segment(&self, slug: &Slug) -> Result<SegmentId> {
        let mut inner = self.inner.write();
        ensure!(
            !inner.segments.contains_key(slug),
            SegmentExistsSnafu { slug: slug.clone() }
        );
        inner.next_segment_id += 1;
        let id = SegmentId::new(inner.next_segment_id);
        inner.segments.insert(slug.clone(), id);
        Ok(id)
    }

    async fn remove_segment(&self, slug: &Slug) -> Result<()> {
        let mut inner = self.inner.write();
        ensure!(
            inner.segments.remove(slug).is_some(),
            SegmentNotFoundSnafu { slug: slug.clone() }
        );
        // Cascade, as the foreign key does in PostgreSQL.
        inner.memberships.retain(|(_, member_slug), _| member_slug != slug);
        Ok(())
    }
}

#[async_trait]
impl MembershipEngine for MemoryStore {
    async fn change_user_segments(
        &self,
        user_id: UserId,
        to_add: &[MembershipAdd],
        to_delete: &[Slug],
    ) -> Result<()> {
        if to_add.is_empty() && to_delete.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();

        // Validate deletes first, then adds against the post-delete view,
        // mutating nothing until the whole batch is known good.
        for slug in to_delete {
            ensure!(
                inner.segments.contains_key(slug),
                SegmentNotFoundSnafu { slug: slug.clone() }
            );
        }

        let mut staged: Vec<(Slug, Option<DateTime<Utc>>)> = Vec::with_capacity(to_add.len());
        for entry in to_add {
            ensure!(
                inner.segments.contains_key(&entry.slug),
                SegmentNotFoundSnafu { slug: entry.slug.clone() }
            );
            let key = (user_id, entry.slug.clone());
            let deleted_in_batch = to_delete.contains(&entry.slug);
            let already_member = inner.memberships.contains_key(&key) && !deleted_in_batch;
            let duplicated_in_batch = staged.iter().any(|(slug, _)| *slug == entry.slug);
            ensure!(
                !already_member && !duplicated_in_batch,
                AlreadyMemberSnafu { user_id, slug: entry.slug.clone() }
            );
            staged.push((entry.slug.clone(), entry.expiration_date));
        }

        for slug in to_delete {
            inner.memberships.remove(&(user_id, slug.clone()));
        }
        for (slug, expiration) in staged {
            inner.memberships.insert((user_id, slug), expiration);
        }
        Ok(())
    }

    async fn user_segments(&self, user_id: UserId) -> Result<Vec<Slug>> {
        let inner = self.inner.read();
        Ok(inner
            .memberships
            .keys()
            .filter(|(member, _)| *member == user_id)
            .map(|(_, slug)| slug.clone())
            .collect())
    }
}

#[async_trait]
impl ExpiredPurge for MemoryStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write();
        let before = inner.memberships.len();
        inner
            .memberships
            .retain(|_, expiration| expiration.map_or(true, |at| at > now));
        Ok((before - inner.memberships.len()) as u64)
    }
}
