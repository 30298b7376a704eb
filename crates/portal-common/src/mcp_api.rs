use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchGuidesParams {
    /// Words that must all appear in the title, content or category name.
    pub query: Option<String>,
    /// Category name, "Uncategorized", or "all" (default).
    pub category: Option<String>,
    /// 1-based page of unpinned guides (default: 1, 10 per page).
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetGuideParams {
    /// Guide ID as returned by search_guides.
    pub guide_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SaveGuideParams {
    /// Existing guide ID to update. Omit to create a new guide.
    pub guide_id: Option<String>,
    pub title: String,
    /// Markdown or legacy HTML; stored as canonical Markdown.
    pub content: String,
    /// Category ID from list_categories. Omit for "Uncategorized".
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetPinnedParams {
    pub guide_id: String,
    pub pinned: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteGuideParams {
    pub guide_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PreviewContentParams {
    /// Markdown or legacy HTML to convert.
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuideSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub is_pinned: bool,
    pub views: u64,
    /// Plain-text excerpt of the content.
    pub summary: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchGuidesResponse {
    pub pinned: Vec<GuideSummary>,
    pub guides: Vec<GuideSummary>,
    /// Most viewed guides of the result set.
    pub popular: Vec<GuideSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub total: usize,
    /// Set when the listing could not be refreshed and older results are shown.
    pub stale_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuideDetailResponse {
    pub id: String,
    pub title: String,
    pub category: String,
    pub category_id: Option<String>,
    pub is_pinned: bool,
    pub views: u64,
    /// Canonical Markdown.
    pub content: String,
    /// Sanitized HTML rendering of the content.
    pub html: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MutationResponse {
    pub guide_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewContentResponse {
    pub canonical: String,
    pub html: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PortalStatusResponse {
    pub organization_id: String,
    /// "admin", "member" or "guest".
    pub role: String,
    pub can_edit: bool,
    pub can_manage: bool,
    /// False once the change subscription was lost.
    pub live_updates: bool,
    pub redis_available: bool,
}
