//! Per-organization guide query cache.
//!
//! Entries are keyed by [`GuideQuery`] and expire after a TTL. Concurrent
//! identical queries share one remote fetch. Invalidation bumps an epoch per
//! organization; a fetch that started under an older epoch still answers its
//! own callers but is never stored or joined afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use portal_common::error::RemoteError;
use portal_common::model::{CategoryFilter, Guide, GuideQuery, SortOrder};
use portal_common::remote::GuideService;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

type GuideFetch = Shared<BoxFuture<'static, Result<Arc<[Guide]>, RemoteError>>>;

struct CacheEntry {
    guides: Arc<[Guide]>,
    captured_at: Instant,
}

#[derive(Default)]
struct OrgState {
    epoch: u64,
    entries: HashMap<GuideQuery, CacheEntry>,
    in_flight: HashMap<GuideQuery, GuideFetch>,
}

type State = Arc<Mutex<HashMap<String, OrgState>>>;

fn lock(state: &State) -> MutexGuard<'_, HashMap<String, OrgState>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct GuideCache {
    remote: Arc<dyn GuideService>,
    ttl: Duration,
    state: State,
}

impl GuideCache {
    pub fn new(remote: Arc<dyn GuideService>, ttl: Duration) -> Self {
        Self {
            remote,
            ttl,
            state: Arc::default(),
        }
    }

    pub async fn query(
        &self,
        organization_id: &str,
        search: &str,
        category: CategoryFilter,
    ) -> Result<Arc<[Guide]>, RemoteError> {
        let query = GuideQuery::new(organization_id, search, category);
        let fetch = {
            let mut state = lock(&self.state);
            let org = state.entry(query.organization_id.clone()).or_default();

            if let Some(entry) = org.entries.get(&query) {
                if entry.captured_at.elapsed() < self.ttl {
                    debug!(
                        organization_id,
                        search = %query.search,
                        category = query.category.label(),
                        "guide cache hit"
                    );
                    return Ok(Arc::clone(&entry.guides));
                }
                org.entries.remove(&query);
            }

            match org.in_flight.get(&query) {
                Some(fetch) => {
                    debug!(organization_id, search = %query.search, "joining in-flight guide fetch");
                    fetch.clone()
                }
                None => {
                    let fetch = self.start_fetch(query.clone(), org.epoch);
                    org.in_flight.insert(query, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Drops every entry and in-flight registration of the organization.
    /// Nothing is refetched until the next query.
    pub fn invalidate_all(&self, organization_id: &str) {
        let mut state = lock(&self.state);
        let org = state.entry(organization_id.to_string()).or_default();
        org.epoch += 1;
        org.entries.clear();
        org.in_flight.clear();
        debug!(organization_id, epoch = org.epoch, "guide cache invalidated");
    }

    fn start_fetch(&self, query: GuideQuery, epoch: u64) -> GuideFetch {
        let remote = Arc::clone(&self.remote);
        let state = Arc::clone(&self.state);
        async move {
            let result = remote
                .fetch_guides(&query, SortOrder::default())
                .await
                .map(Arc::<[Guide]>::from);

            let mut state = lock(&state);
            match state.get_mut(&query.organization_id) {
                Some(org) if org.epoch == epoch => {
                    org.in_flight.remove(&query);
                    if let Ok(guides) = &result {
                        org.entries.insert(
                            query,
                            CacheEntry {
                                guides: Arc::clone(guides),
                                captured_at: Instant::now(),
                            },
                        );
                    }
                }
                _ => debug!(
                    organization_id = %query.organization_id,
                    epoch,
                    "discarding guide fetch that started before an invalidation"
                ),
            }
            result
        }
        .boxed()
        .shared()
    }
}
