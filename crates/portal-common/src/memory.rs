//! In-process implementation of [`GuideService`], optionally seeded from JSON.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::generate_access_code;
use crate::error::{CommonError, RemoteError};
use crate::model::{
    Category, ChangeKind, Guide, GuideChange, GuideDraft, GuideQuery, Membership, Organization,
    SortOrder,
};
use crate::remote::{GuideChanges, GuideService};

const CHANGE_CAPACITY: usize = 256;

/// Initial data for [`InMemoryGuideService`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub guides: Vec<Guide>,
}

pub struct InMemoryGuideService {
    data: Mutex<Seed>,
    changes: Mutex<broadcast::Sender<GuideChange>>,
}

impl Default for InMemoryGuideService {
    fn default() -> Self {
        Self::from_seed(Seed::default())
    }
}

impl InMemoryGuideService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            data: Mutex::new(seed),
            changes: Mutex::new(tx),
        }
    }

    pub fn from_seed_file(path: &Path) -> Result<Self, CommonError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CommonError::Seed(format!("{}: {e}", path.display())))?;
        let seed: Seed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            organizations = seed.organizations.len(),
            guides = seed.guides.len(),
            "loaded seed data"
        );
        Ok(Self::from_seed(seed))
    }

    /// Creates an organization with a fresh access code.
    pub fn register_organization(&self, name: &str, allow_guest_write: bool) -> Organization {
        let mut data = self.lock();
        let mut code = generate_access_code();
        while data.organizations.iter().any(|o| o.unique_code == code) {
            code = generate_access_code();
        }
        let org = Organization {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            unique_code: code,
            allow_guest_write,
        };
        data.organizations.push(org.clone());
        org
    }

    pub fn add_membership(&self, membership: Membership) {
        self.lock().memberships.push(membership);
    }

    pub fn add_category(&self, organization_id: &str, name: &str) -> Category {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            organization_id: organization_id.to_string(),
        };
        self.lock().categories.push(category.clone());
        category
    }

    /// Ends every open change subscription.
    pub fn disconnect_subscribers(&self) {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        if let Ok(mut changes) = self.changes.lock() {
            *changes = tx;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Seed> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, organization_id: &str, kind: ChangeKind, guide_id: &str) {
        let Ok(changes) = self.changes.lock() else {
            return;
        };
        // No receivers is not an error.
        let _ = changes.send(GuideChange {
            organization_id: organization_id.to_string(),
            kind,
            guide_id: guide_id.to_string(),
        });
    }

    fn resolve_category(
        data: &Seed,
        organization_id: &str,
        category_id: Option<&str>,
    ) -> Result<Option<Category>, RemoteError> {
        let Some(id) = category_id else {
            return Ok(None);
        };
        data.categories
            .iter()
            .find(|c| c.id == id && c.organization_id == organization_id)
            .cloned()
            .map(Some)
            .ok_or_else(|| RemoteError::Request {
                code: "invalid_category".to_string(),
                message: format!("unknown category: {id}"),
            })
    }

    fn with_guide<T>(
        &self,
        guide_id: &str,
        apply: impl FnOnce(&mut Guide) -> T,
    ) -> Result<(String, T), RemoteError> {
        let mut data = self.lock();
        let guide = data
            .guides
            .iter_mut()
            .find(|g| g.id == guide_id)
            .ok_or_else(|| RemoteError::NotFound(format!("guide {guide_id}")))?;
        let out = apply(guide);
        Ok((guide.organization_id.clone(), out))
    }
}

fn matches_terms(guide: &Guide, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!(
        "{}\n{}\n{}",
        guide.title,
        guide.content,
        guide.category.as_ref().map(|c| c.name.as_str()).unwrap_or("")
    )
    .to_lowercase();
    terms.iter().all(|t| haystack.contains(t.as_str()))
}

#[async_trait]
impl GuideService for InMemoryGuideService {
    async fn fetch_guides(
        &self,
        query: &GuideQuery,
        sort: SortOrder,
    ) -> Result<Vec<Guide>, RemoteError> {
        let terms = query.terms();
        let data = self.lock();
        let mut guides: Vec<Guide> = data
            .guides
            .iter()
            .filter(|g| g.organization_id == query.organization_id)
            .filter(|g| query.category.matches(g))
            .filter(|g| matches_terms(g, &terms))
            .cloned()
            .collect();
        guides.sort_by(|a, b| sort.compare(a, b));
        Ok(guides)
    }

    async fn fetch_categories(&self, organization_id: &str) -> Result<Vec<Category>, RemoteError> {
        let data = self.lock();
        let mut categories: Vec<Category> = data
            .categories
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn increment_views(&self, guide_id: &str) -> Result<(), RemoteError> {
        let (org, ()) = self.with_guide(guide_id, |g| g.views += 1)?;
        self.notify(&org, ChangeKind::Update, guide_id);
        Ok(())
    }

    async fn create_guide(&self, draft: GuideDraft) -> Result<Guide, RemoteError> {
        let guide = {
            let mut data = self.lock();
            let category =
                Self::resolve_category(&data, &draft.organization_id, draft.category_id.as_deref())?;
            let now = Utc::now();
            let guide = Guide {
                id: Uuid::new_v4().to_string(),
                title: draft.title,
                content: draft.content,
                is_pinned: false,
                category,
                views: 0,
                created_at: now,
                updated_at: now,
                organization_id: draft.organization_id,
                created_by: draft.created_by,
            };
            data.guides.push(guide.clone());
            guide
        };
        self.notify(&guide.organization_id, ChangeKind::Insert, &guide.id);
        Ok(guide)
    }

    async fn update_guide(&self, guide_id: &str, draft: GuideDraft) -> Result<Guide, RemoteError> {
        let guide = {
            let mut data = self.lock();
            let org = data
                .guides
                .iter()
                .find(|g| g.id == guide_id)
                .map(|g| g.organization_id.clone())
                .ok_or_else(|| RemoteError::NotFound(format!("guide {guide_id}")))?;
            let category = Self::resolve_category(&data, &org, draft.category_id.as_deref())?;
            let guide = data
                .guides
                .iter_mut()
                .find(|g| g.id == guide_id)
                .ok_or_else(|| RemoteError::NotFound(format!("guide {guide_id}")))?;
            guide.title = draft.title;
            guide.content = draft.content;
            guide.category = category;
            guide.updated_at = Utc::now();
            guide.clone()
        };
        self.notify(&guide.organization_id, ChangeKind::Update, guide_id);
        Ok(guide)
    }

    async fn set_pinned(&self, guide_id: &str, pinned: bool) -> Result<(), RemoteError> {
        let (org, ()) = self.with_guide(guide_id, |g| {
            g.is_pinned = pinned;
            g.updated_at = Utc::now();
        })?;
        self.notify(&org, ChangeKind::Update, guide_id);
        Ok(())
    }

    async fn delete_guide(&self, guide_id: &str) -> Result<(), RemoteError> {
        let org = {
            let mut data = self.lock();
            let index = data
                .guides
                .iter()
                .position(|g| g.id == guide_id)
                .ok_or_else(|| RemoteError::NotFound(format!("guide {guide_id}")))?;
            data.guides.remove(index).organization_id
        };
        self.notify(&org, ChangeKind::Delete, guide_id);
        Ok(())
    }

    async fn subscribe_to_guide_changes(
        &self,
        organization_id: &str,
    ) -> Result<GuideChanges, RemoteError> {
        let rx = self
            .changes
            .lock()
            .map_err(|_| RemoteError::Unavailable("change channel poisoned".to_string()))?
            .subscribe();
        let organization_id = organization_id.to_string();

        let stream = futures::stream::unfold(rx, move |mut rx| {
            let organization_id = organization_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(change) if change.organization_id == organization_id => {
                            return Some((change, rx));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "guide change subscriber lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn find_organization_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Organization>, RemoteError> {
        let data = self.lock();
        Ok(data
            .organizations
            .iter()
            .find(|o| o.unique_code == code)
            .cloned())
    }

    async fn find_membership(&self, user_id: &str) -> Result<Option<Membership>, RemoteError> {
        let data = self.lock();
        Ok(data
            .memberships
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryFilter, Role};
    use futures::StreamExt;

    fn draft(org: &str, title: &str, content: &str, category_id: Option<&str>) -> GuideDraft {
        GuideDraft {
            organization_id: org.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category_id: category_id.map(str::to_string),
            created_by: None,
        }
    }

    async fn seeded() -> (InMemoryGuideService, Organization, Category) {
        let service = InMemoryGuideService::new();
        let org = service.register_organization("Acme", false);
        let onboarding = service.add_category(&org.id, "Onboarding");
        service
            .create_guide(draft(&org.id, "Laptop setup", "Install the **VPN** client", Some(&onboarding.id)))
            .await
            .unwrap();
        service
            .create_guide(draft(&org.id, "Expenses", "Submit receipts monthly", None))
            .await
            .unwrap();
        (service, org, onboarding)
    }

    #[tokio::test]
    async fn search_requires_every_term_case_insensitively() {
        let (service, org, _) = seeded().await;
        let query = GuideQuery::new(&org.id, "vpn LAPTOP", CategoryFilter::All);
        let found = service.fetch_guides(&query, SortOrder::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Laptop setup");

        let query = GuideQuery::new(&org.id, "vpn receipts", CategoryFilter::All);
        let found = service.fetch_guides(&query, SortOrder::default()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn search_matches_category_names() {
        let (service, org, _) = seeded().await;
        let query = GuideQuery::new(&org.id, "onboarding", CategoryFilter::All);
        let found = service.fetch_guides(&query, SortOrder::default()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn category_filter_selects_named_and_uncategorized() {
        let (service, org, _) = seeded().await;
        let named = GuideQuery::new(&org.id, "", CategoryFilter::Named("Onboarding".to_string()));
        let uncategorized = GuideQuery::new(&org.id, "", CategoryFilter::Uncategorized);
        let a = service.fetch_guides(&named, SortOrder::default()).await.unwrap();
        let b = service.fetch_guides(&uncategorized, SortOrder::default()).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].title, "Laptop setup");
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].title, "Expenses");
    }

    #[tokio::test]
    async fn guides_are_scoped_to_their_organization() {
        let (service, _, _) = seeded().await;
        let other = service.register_organization("Other", true);
        let query = GuideQuery::new(&other.id, "", CategoryFilter::All);
        assert!(service.fetch_guides(&query, SortOrder::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let service = InMemoryGuideService::new();
        let org = service.register_organization("Acme", false);
        let err = service
            .create_guide(draft(&org.id, "T", "c", Some("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Request { .. }));
    }

    #[tokio::test]
    async fn mutations_notify_subscribers_of_the_organization() {
        let (service, org, _) = seeded().await;
        let other = service.register_organization("Other", false);
        let mut changes = service.subscribe_to_guide_changes(&org.id).await.unwrap();

        service
            .create_guide(draft(&other.id, "Elsewhere", "x", None))
            .await
            .unwrap();
        let created = service
            .create_guide(draft(&org.id, "Holidays", "x", None))
            .await
            .unwrap();
        service.increment_views(&created.id).await.unwrap();
        service.delete_guide(&created.id).await.unwrap();

        let kinds: Vec<ChangeKind> = changes.by_ref().take(3).map(|c| c.kind).collect().await;
        assert_eq!(kinds, [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions() {
        let (service, org, _) = seeded().await;
        let mut changes = service.subscribe_to_guide_changes(&org.id).await.unwrap();
        service.disconnect_subscribers();
        assert!(changes.next().await.is_none());
    }

    #[tokio::test]
    async fn increments_and_pins_persist() {
        let (service, org, _) = seeded().await;
        let query = GuideQuery::new(&org.id, "expenses", CategoryFilter::All);
        let id = service.fetch_guides(&query, SortOrder::default()).await.unwrap()[0]
            .id
            .clone();
        service.increment_views(&id).await.unwrap();
        service.set_pinned(&id, true).await.unwrap();
        let guide = &service.fetch_guides(&query, SortOrder::default()).await.unwrap()[0];
        assert_eq!(guide.views, 1);
        assert!(guide.is_pinned);
        assert_eq!(
            service.increment_views("missing").await,
            Err(RemoteError::NotFound("guide missing".to_string()))
        );
    }

    #[tokio::test]
    async fn lookups_by_code_and_user() {
        let service = InMemoryGuideService::new();
        let org = service.register_organization("Acme", true);
        service.add_membership(Membership {
            user_id: "u1".to_string(),
            organization_id: org.id.clone(),
            role: Role::Admin,
        });
        let found = service.find_organization_by_code(&org.unique_code).await.unwrap();
        assert_eq!(found, Some(org.clone()));
        assert_eq!(service.find_organization_by_code("ZZZZZZ").await.unwrap(), None);
        let membership = service.find_membership("u1").await.unwrap().unwrap();
        assert_eq!(membership.role, Role::Admin);
        assert_eq!(service.find_membership("u2").await.unwrap(), None);
    }

    #[test]
    fn seed_parses_from_json() {
        let seed: Seed = serde_json::from_str(
            r#"{
                "organizations": [{"id": "o1", "name": "Acme", "unique_code": "ACME01"}],
                "memberships": [{"user_id": "u1", "organization_id": "o1", "role": "member"}]
            }"#,
        )
        .unwrap();
        assert_eq!(seed.organizations.len(), 1);
        assert!(!seed.organizations[0].allow_guest_write);
        assert_eq!(seed.memberships[0].role, Role::Member);
        assert!(seed.guides.is_empty());
    }
}
