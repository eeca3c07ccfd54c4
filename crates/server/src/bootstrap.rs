//! Store bootstrap and dependency wiring.
//!
//! Builds the configured store backend, injects it into the handler state
//! through the capability traits, and prepares the TTL sweeper. Nothing here
//! resolves dependencies ambiently; every implementation is chosen once and
//! passed down explicitly.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use segmentd_storage::{ExpiredPurge, MemoryStore, MembershipEngine, PgStore, SegmentRegistry};
use segmentd_types::{Result, SegmentError};

use crate::api::AppState;
use crate::config::Config;
use crate::sweeper::TtlSweeper;

/// Bootstrapped server components, ready to serve.
pub struct BootstrappedServer {
    /// Handler state wired to the chosen store.
    pub state: AppState,
    /// The TTL sweeper, not yet started.
    pub sweeper: TtlSweeper,
}

/// Build the store backend and wire the server components.
///
/// With a `postgres` section the durable store is used; connecting also
/// bootstraps the schema and verifies connectivity, so a misconfigured
/// database fails here rather than on the first request. Without one the
/// service runs on the volatile in-memory store and warns about it.
pub async fn bootstrap(config: &Config) -> Result<BootstrappedServer, SegmentError> {
    let (registry, engine, purge): (
        Arc<dyn SegmentRegistry>,
        Arc<dyn MembershipEngine>,
        Arc<dyn ExpiredPurge>,
    ) = match &config.postgres {
        Some(postgres) => {
            let store = Arc::new(PgStore::connect(postgres).await?);
            (store.clone(), store.clone(), store)
        }
        None => {
            warn!(
                "Running in ephemeral mode against the in-memory store. All segments and \
                 memberships are lost on shutdown. Configure [postgres] for durable storage."
            );
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store.clone(), store)
        }
    };

    let state = AppState {
        registry,
        engine,
        request_timeout: Duration::from_secs(config.http.request_timeout_secs),
    };
    let sweeper = TtlSweeper::from_config(purge, &config.sweeper);

    Ok(BootstrappedServer { state, sweeper })
}
