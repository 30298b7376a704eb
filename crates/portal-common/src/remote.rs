//! The remote guide service seen by the portal.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RemoteError;
use crate::model::{
    Category, Guide, GuideChange, GuideDraft, GuideQuery, Membership, Organization, SortOrder,
};

/// Change notifications for one organization. The stream ending means the
/// subscription was lost.
pub type GuideChanges = BoxStream<'static, GuideChange>;

#[async_trait]
pub trait GuideService: Send + Sync {
    async fn fetch_guides(
        &self,
        query: &GuideQuery,
        sort: SortOrder,
    ) -> Result<Vec<Guide>, RemoteError>;

    /// Categories of an organization ordered by name.
    async fn fetch_categories(&self, organization_id: &str) -> Result<Vec<Category>, RemoteError>;

    async fn increment_views(&self, guide_id: &str) -> Result<(), RemoteError>;

    async fn create_guide(&self, draft: GuideDraft) -> Result<Guide, RemoteError>;

    async fn update_guide(&self, guide_id: &str, draft: GuideDraft) -> Result<Guide, RemoteError>;

    async fn set_pinned(&self, guide_id: &str, pinned: bool) -> Result<(), RemoteError>;

    async fn delete_guide(&self, guide_id: &str) -> Result<(), RemoteError>;

    async fn subscribe_to_guide_changes(
        &self,
        organization_id: &str,
    ) -> Result<GuideChanges, RemoteError>;

    async fn find_organization_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Organization>, RemoteError>;

    async fn find_membership(&self, user_id: &str) -> Result<Option<Membership>, RemoteError>;
}
