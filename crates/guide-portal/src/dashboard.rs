//! The guide dashboard of one session: listing, viewing, editing and
//! live invalidation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use guide_editor::Editor;
use portal_common::error::RemoteError;
use portal_common::model::{Category, CategoryFilter, Guide, GuideChange, GuideDraft};
use portal_common::remote::{GuideChanges, GuideService};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{GuideCache, DEFAULT_TTL};
use crate::error::AppError;
use crate::session::{Action, Session};
use crate::views::{ViewSettings, ViewTracker};

pub const GUIDES_PER_PAGE: usize = 10;
pub const POPULAR_GUIDES: usize = 5;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardSettings {
    pub cache_ttl: Duration,
    pub views: ViewSettings,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            views: ViewSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    /// A guide changed remotely; the cache was invalidated.
    GuidesChanged(GuideChange),
    /// The change subscription ended; listings may go stale.
    SubscriptionLost,
}

/// One query result split for display.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideListing {
    pub pinned: Vec<Guide>,
    pub unpinned: Vec<Guide>,
    pub popular: Vec<Guide>,
    /// Set when this listing is the previous one, shown because a refresh
    /// failed.
    pub stale_error: Option<RemoteError>,
}

impl GuideListing {
    pub fn from_guides(guides: &[Guide]) -> Self {
        let (pinned, unpinned): (Vec<Guide>, Vec<Guide>) =
            guides.iter().cloned().partition(|g| g.is_pinned);
        let mut popular = guides.to_vec();
        popular.sort_by(|a, b| b.views.cmp(&a.views));
        popular.truncate(POPULAR_GUIDES);
        Self {
            pinned,
            unpinned,
            popular,
            stale_error: None,
        }
    }

    pub fn total(&self) -> usize {
        self.pinned.len() + self.unpinned.len()
    }

    pub fn total_pages(&self) -> usize {
        self.unpinned.len().div_ceil(GUIDES_PER_PAGE).max(1)
    }

    /// Unpinned guides of a 1-based page; out-of-range pages are empty.
    pub fn page(&self, page: usize) -> &[Guide] {
        let start = page.saturating_sub(1).saturating_mul(GUIDES_PER_PAGE);
        if start >= self.unpinned.len() {
            return &[];
        }
        let end = (start + GUIDES_PER_PAGE).min(self.unpinned.len());
        &self.unpinned[start..end]
    }
}

pub struct Dashboard {
    remote: Arc<dyn GuideService>,
    session: Session,
    cache: GuideCache,
    views: ViewTracker,
    categories: Mutex<Vec<Category>>,
    last_listing: Mutex<Option<GuideListing>>,
    live: Arc<AtomicBool>,
    events: broadcast::Sender<DashboardEvent>,
    listener: Option<JoinHandle<()>>,
}

impl Dashboard {
    pub async fn open(
        remote: Arc<dyn GuideService>,
        session: Session,
        settings: DashboardSettings,
    ) -> Self {
        let cache = GuideCache::new(Arc::clone(&remote), settings.cache_ttl);
        let views = ViewTracker::new(Arc::clone(&remote), settings.views);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let live = Arc::new(AtomicBool::new(false));
        let organization_id = session.organization_id.clone();

        let categories = remote
            .fetch_categories(&organization_id)
            .await
            .inspect_err(|e| {
                warn!(error = %e, organization_id = %organization_id, "failed to load categories")
            })
            .unwrap_or_default();

        let listener = match remote.subscribe_to_guide_changes(&organization_id).await {
            Ok(changes) => {
                live.store(true, Ordering::SeqCst);
                Some(tokio::spawn(listen(
                    changes,
                    cache.clone(),
                    organization_id.clone(),
                    Arc::clone(&live),
                    events.clone(),
                )))
            }
            Err(e) => {
                warn!(error = %e, organization_id = %organization_id, "failed to subscribe to guide changes");
                None
            }
        };

        info!(
            organization_id = %organization_id,
            role = session.role_name(),
            categories = categories.len(),
            live = live.load(Ordering::SeqCst),
            "dashboard opened"
        );

        Self {
            remote,
            session,
            cache,
            views,
            categories: Mutex::new(categories),
            last_listing: Mutex::new(None),
            live,
            events,
            listener,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    /// False once the change subscription was lost or never established.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub async fn refresh_categories(&self) -> Result<Vec<Category>, AppError> {
        let categories = self
            .remote
            .fetch_categories(&self.session.organization_id)
            .await?;
        if let Ok(mut slot) = self.categories.lock() {
            *slot = categories.clone();
        }
        Ok(categories)
    }

    pub async fn list_guides(
        &self,
        search: &str,
        category: CategoryFilter,
    ) -> Result<GuideListing, AppError> {
        let organization_id = &self.session.organization_id;
        match self.cache.query(organization_id, search, category).await {
            Ok(guides) => {
                let listing = GuideListing::from_guides(&guides);
                if let Ok(mut last) = self.last_listing.lock() {
                    *last = Some(listing.clone());
                }
                Ok(listing)
            }
            Err(e) => {
                warn!(error = %e, organization_id = %organization_id, "failed to load guides");
                let previous = self.last_listing.lock().ok().and_then(|l| l.clone());
                match previous {
                    Some(mut listing) => {
                        listing.stale_error = Some(e);
                        Ok(listing)
                    }
                    None => Err(e.into()),
                }
            }
        }
    }

    /// Looks the guide up in the organization's current guides and records
    /// a view. Goes through the cache, so a guide changed since the last
    /// listing is never served from that listing.
    pub async fn open_guide(&self, guide_id: &str) -> Result<Guide, AppError> {
        let all = self
            .cache
            .query(&self.session.organization_id, "", CategoryFilter::All)
            .await?;
        let guide = all
            .iter()
            .find(|g| g.id == guide_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(guide_id.to_string()))?;
        self.views.record_view(&guide.id);
        Ok(guide)
    }

    /// Creates a guide, or updates `existing_id`. Content may be Markdown or
    /// legacy HTML and is stored in canonical form.
    pub async fn save_guide(
        &self,
        existing_id: Option<&str>,
        title: &str,
        content: &str,
        category_id: Option<&str>,
    ) -> Result<Guide, AppError> {
        let action = if existing_id.is_some() {
            Action::Edit
        } else {
            Action::Create
        };
        self.session.require(action)?;

        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidDraft("title must not be empty".to_string()));
        }
        let draft = GuideDraft {
            organization_id: self.session.organization_id.clone(),
            title: title.to_string(),
            content: guide_format::normalize_canonical(content),
            category_id: category_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            created_by: self.session.user_id.clone(),
        };

        let saved = match existing_id {
            Some(id) => self.remote.update_guide(id, draft).await?,
            None => self.remote.create_guide(draft).await?,
        };
        self.cache.invalidate_all(&self.session.organization_id);
        info!(guide_id = %saved.id, action = %action, "guide saved");
        Ok(saved)
    }

    pub async fn set_pinned(&self, guide_id: &str, pinned: bool) -> Result<(), AppError> {
        self.session.require(Action::Pin)?;
        self.remote.set_pinned(guide_id, pinned).await?;
        self.cache.invalidate_all(&self.session.organization_id);
        info!(guide_id, pinned, "guide pin changed");
        Ok(())
    }

    pub async fn delete_guide(&self, guide_id: &str) -> Result<(), AppError> {
        self.session.require(Action::Delete)?;
        self.remote.delete_guide(guide_id).await?;
        self.cache.invalidate_all(&self.session.organization_id);
        info!(guide_id, "guide deleted");
        Ok(())
    }

    /// An editor loaded with the guide (or empty for a new one). Read-only
    /// guests cannot edit.
    pub fn edit_guide(&self, guide: Option<&Guide>) -> Result<GuideEditor, AppError> {
        let action = if guide.is_some() {
            Action::Edit
        } else {
            Action::Create
        };
        self.session.require(action)?;
        Ok(GuideEditor::new(guide))
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.views.shutdown();
    }
}

async fn listen(
    mut changes: GuideChanges,
    cache: GuideCache,
    organization_id: String,
    live: Arc<AtomicBool>,
    events: broadcast::Sender<DashboardEvent>,
) {
    while let Some(change) = changes.next().await {
        debug!(
            organization_id = %organization_id,
            guide_id = %change.guide_id,
            kind = ?change.kind,
            "guide change received"
        );
        cache.invalidate_all(&organization_id);
        let _ = events.send(DashboardEvent::GuidesChanged(change));
    }
    warn!(organization_id = %organization_id, "guide change subscription lost");
    live.store(false, Ordering::SeqCst);
    let _ = events.send(DashboardEvent::SubscriptionLost);
}

/// Editing state of one guide. The editor's change callback keeps the draft
/// content current.
pub struct GuideEditor {
    guide_id: Option<String>,
    pub title: String,
    pub category_id: Option<String>,
    editor: Editor,
    content: Arc<Mutex<String>>,
}

impl GuideEditor {
    fn new(guide: Option<&Guide>) -> Self {
        let initial = guide.map(|g| g.content.as_str()).unwrap_or("");
        let mut editor = Editor::with_content(initial);
        let content = Arc::new(Mutex::new(editor.content()));
        let sink = Arc::clone(&content);
        editor.on_change(move |markdown| {
            if let Ok(mut slot) = sink.lock() {
                *slot = markdown.to_string();
            }
        });
        Self {
            guide_id: guide.map(|g| g.id.clone()),
            title: guide.map(|g| g.title.clone()).unwrap_or_default(),
            category_id: guide.and_then(|g| g.category.as_ref().map(|c| c.id.clone())),
            editor,
            content,
        }
    }

    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    /// Latest content reported by the editor.
    pub fn content(&self) -> String {
        self.content
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub async fn save(&self, dashboard: &Dashboard) -> Result<Guide, AppError> {
        dashboard
            .save_guide(
                self.guide_id.as_deref(),
                &self.title,
                &self.content(),
                self.category_id.as_deref(),
            )
            .await
    }
}
