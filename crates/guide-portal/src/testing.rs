//! Scripted guide service for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use portal_common::error::RemoteError;
use portal_common::model::{
    Category, Guide, GuideChange, GuideDraft, GuideQuery, Membership, Organization, SortOrder,
};
use portal_common::remote::{GuideChanges, GuideService};
use tokio::sync::{mpsc, oneshot};

pub fn guide(id: &str, views: u64) -> Guide {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Guide {
        id: id.to_string(),
        title: format!("Guide {id}"),
        content: format!("Content of {id}"),
        is_pinned: false,
        category: None,
        views,
        created_at: at,
        updated_at: at,
        organization_id: "org".to_string(),
        created_by: None,
    }
}

pub fn ids(guides: &[Guide]) -> Vec<&str> {
    guides.iter().map(|g| g.id.as_str()).collect()
}

#[derive(Default)]
pub struct FakeGuideService {
    guides: Mutex<Vec<Guide>>,
    fetch_calls: AtomicUsize,
    remote_calls: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_increments: AtomicBool,
    fail_subscribe: AtomicBool,
    held_fetch: Mutex<Option<oneshot::Receiver<()>>>,
    increments: Mutex<Vec<String>>,
    drafts: Mutex<Vec<GuideDraft>>,
    changes: Mutex<Option<mpsc::UnboundedSender<GuideChange>>>,
}

impl FakeGuideService {
    pub fn with_guides(guides: Vec<Guide>) -> Self {
        Self {
            guides: Mutex::new(guides),
            ..Self::default()
        }
    }

    pub fn set_guides(&self, guides: Vec<Guide>) {
        *self.guides.lock().unwrap() = guides;
    }

    /// The next fetch returns the data present when it was called, but only
    /// after the returned sender fires.
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held_fetch.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every call on the service, reads included.
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    pub fn increments(&self) -> Vec<String> {
        self.increments.lock().unwrap().clone()
    }

    pub fn drafts(&self) -> Vec<GuideDraft> {
        self.drafts.lock().unwrap().clone()
    }

    /// Pushes a change to the open subscription, if any.
    pub fn push_change(&self, change: GuideChange) -> bool {
        self.changes
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(change).is_ok())
    }

    /// Ends the open subscription.
    pub fn drop_subscription(&self) {
        self.changes.lock().unwrap().take();
    }

    pub fn has_subscriber(&self) -> bool {
        self.changes
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn called(&self) {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn stored(&self, id: &str, draft: GuideDraft) -> Guide {
        self.drafts.lock().unwrap().push(draft.clone());
        Guide {
            title: draft.title,
            content: draft.content,
            organization_id: draft.organization_id,
            created_by: draft.created_by,
            ..guide(id, 0)
        }
    }
}

#[async_trait]
impl GuideService for FakeGuideService {
    async fn fetch_guides(
        &self,
        _query: &GuideQuery,
        _sort: SortOrder,
    ) -> Result<Vec<Guide>, RemoteError> {
        self.called();
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.guides.lock().unwrap().clone();
        let held = self.held_fetch.lock().unwrap().take();
        if let Some(release) = held {
            let _ = release.await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted failure".to_string()));
        }
        Ok(snapshot)
    }

    async fn fetch_categories(&self, organization_id: &str) -> Result<Vec<Category>, RemoteError> {
        self.called();
        Ok(vec![Category {
            id: "c1".to_string(),
            name: "Onboarding".to_string(),
            organization_id: organization_id.to_string(),
        }])
    }

    async fn increment_views(&self, guide_id: &str) -> Result<(), RemoteError> {
        self.called();
        self.increments.lock().unwrap().push(guide_id.to_string());
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }
        Ok(())
    }

    async fn create_guide(&self, draft: GuideDraft) -> Result<Guide, RemoteError> {
        self.called();
        Ok(self.stored("created", draft))
    }

    async fn update_guide(&self, guide_id: &str, draft: GuideDraft) -> Result<Guide, RemoteError> {
        self.called();
        Ok(self.stored(guide_id, draft))
    }

    async fn set_pinned(&self, _guide_id: &str, _pinned: bool) -> Result<(), RemoteError> {
        self.called();
        Ok(())
    }

    async fn delete_guide(&self, _guide_id: &str) -> Result<(), RemoteError> {
        self.called();
        Ok(())
    }

    async fn subscribe_to_guide_changes(
        &self,
        _organization_id: &str,
    ) -> Result<GuideChanges, RemoteError> {
        self.called();
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("realtime offline".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.changes.lock().unwrap() = Some(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|change| (change, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn find_organization_by_code(
        &self,
        _code: &str,
    ) -> Result<Option<Organization>, RemoteError> {
        self.called();
        Ok(None)
    }

    async fn find_membership(&self, _user_id: &str) -> Result<Option<Membership>, RemoteError> {
        self.called();
        Ok(None)
    }
}
