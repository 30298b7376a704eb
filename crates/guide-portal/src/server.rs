use std::sync::Arc;

use portal_common::mcp_api::{
    CategoryInfo, CategoryListResponse, DeleteGuideParams, GetGuideParams, GuideDetailResponse,
    GuideSummary, MutationResponse, PortalStatusResponse, PreviewContentParams,
    PreviewContentResponse, SaveGuideParams, SearchGuidesParams, SearchGuidesResponse,
    SetPinnedParams,
};
use portal_common::model::{CategoryFilter, Guide};
use portal_common::redis::RedisStore;
use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::{info, warn};

use crate::dashboard::{Dashboard, GuideListing};
use crate::session::Action;

const SUMMARY_CHARS: usize = 200;

#[derive(Clone)]
pub struct GuidePortalServer {
    dashboard: Arc<Dashboard>,
    redis: RedisStore,
    tool_router: ToolRouter<GuidePortalServer>,
}

impl GuidePortalServer {
    pub fn new(dashboard: Arc<Dashboard>, redis: RedisStore) -> Self {
        Self {
            dashboard,
            redis,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl GuidePortalServer {
    #[tool(description = "Search the organization's guides. All words must match the title, content or category name. Pinned guides are listed separately; other guides are paginated 10 per page.")]
    async fn search_guides(
        &self,
        Parameters(params): Parameters<SearchGuidesParams>,
    ) -> Result<Json<SearchGuidesResponse>, String> {
        let search = params.query.unwrap_or_default();
        let category = CategoryFilter::from_param(params.category.as_deref().unwrap_or(""));
        let listing = self
            .dashboard
            .list_guides(&search, category)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        let page = params.page.unwrap_or(1).max(1);
        Ok(Json(to_search_response(&listing, page)))
    }

    #[tool(description = "Get a guide by ID with its Markdown content and rendered HTML. Counts as a view.")]
    async fn get_guide(
        &self,
        Parameters(params): Parameters<GetGuideParams>,
    ) -> Result<Json<GuideDetailResponse>, String> {
        let guide_id = params.guide_id.trim().to_string();
        if guide_id.is_empty() {
            return Err("guide_id must not be empty".to_string());
        }
        let guide = self
            .dashboard
            .open_guide(&guide_id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(to_detail(&guide)))
    }

    #[tool(description = "List the organization's guide categories ordered by name.")]
    async fn list_categories(&self) -> Result<Json<CategoryListResponse>, String> {
        let categories = match self.dashboard.refresh_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "category refresh failed, serving last known categories");
                self.dashboard.categories()
            }
        };
        Ok(Json(CategoryListResponse {
            categories: categories
                .into_iter()
                .map(|c| CategoryInfo {
                    id: c.id,
                    name: c.name,
                })
                .collect(),
        }))
    }

    #[tool(description = "Create a guide, or update one when guide_id is given. Content may be Markdown or HTML and is stored as canonical Markdown.")]
    async fn save_guide(
        &self,
        Parameters(params): Parameters<SaveGuideParams>,
    ) -> Result<Json<GuideDetailResponse>, String> {
        let guide = self
            .dashboard
            .save_guide(
                params.guide_id.as_deref(),
                &params.title,
                &params.content,
                params.category_id.as_deref(),
            )
            .await
            .map_err(|e| format!("save failed: {e}"))?;
        Ok(Json(to_detail(&guide)))
    }

    #[tool(description = "Pin or unpin a guide. Admins only.")]
    async fn set_pinned(
        &self,
        Parameters(params): Parameters<SetPinnedParams>,
    ) -> Result<Json<MutationResponse>, String> {
        self.dashboard
            .set_pinned(&params.guide_id, params.pinned)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(MutationResponse {
            guide_id: params.guide_id,
            action: if params.pinned { "pinned" } else { "unpinned" }.to_string(),
        }))
    }

    #[tool(description = "Delete a guide. Admins only.")]
    async fn delete_guide(
        &self,
        Parameters(params): Parameters<DeleteGuideParams>,
    ) -> Result<Json<MutationResponse>, String> {
        self.dashboard
            .delete_guide(&params.guide_id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(MutationResponse {
            guide_id: params.guide_id,
            action: "deleted".to_string(),
        }))
    }

    #[tool(description = "Convert Markdown or HTML to the canonical Markdown stored for guides, with its HTML rendering and a plain-text summary.")]
    async fn preview_content(
        &self,
        Parameters(params): Parameters<PreviewContentParams>,
    ) -> Result<Json<PreviewContentResponse>, String> {
        let doc = guide_format::to_editable(&params.content);
        let canonical = guide_format::to_canonical(&doc);
        Ok(Json(PreviewContentResponse {
            html: guide_format::render_html(&doc),
            summary: guide_format::summarize(&canonical, SUMMARY_CHARS),
            canonical,
        }))
    }

    #[tool(description = "Show the current session: organization, role, permissions and whether live updates are active.")]
    async fn portal_status(&self) -> Result<Json<PortalStatusResponse>, String> {
        info!("portal_status tool invoked");
        let session = self.dashboard.session();
        Ok(Json(PortalStatusResponse {
            organization_id: session.organization_id.clone(),
            role: session.role_name().to_string(),
            can_edit: session.can(Action::Edit),
            can_manage: session.can(Action::Pin),
            live_updates: self.dashboard.is_live(),
            redis_available: self.redis.is_available().await,
        }))
    }
}

fn to_summary(guide: &Guide) -> GuideSummary {
    GuideSummary {
        id: guide.id.clone(),
        title: guide.title.clone(),
        category: guide.category_name().to_string(),
        is_pinned: guide.is_pinned,
        views: guide.views,
        summary: guide_format::summarize(&guide.content, SUMMARY_CHARS),
        updated_at: guide.updated_at.to_rfc3339(),
    }
}

fn to_search_response(listing: &GuideListing, page: u32) -> SearchGuidesResponse {
    SearchGuidesResponse {
        pinned: listing.pinned.iter().map(to_summary).collect(),
        guides: listing.page(page as usize).iter().map(to_summary).collect(),
        popular: listing.popular.iter().map(to_summary).collect(),
        page,
        total_pages: listing.total_pages() as u32,
        total: listing.total(),
        stale_error: listing.stale_error.as_ref().map(|e| e.to_string()),
    }
}

fn to_detail(guide: &Guide) -> GuideDetailResponse {
    GuideDetailResponse {
        id: guide.id.clone(),
        title: guide.title.clone(),
        category: guide.category_name().to_string(),
        category_id: guide.category.as_ref().map(|c| c.id.clone()),
        is_pinned: guide.is_pinned,
        views: guide.views,
        html: guide_format::render_html(&guide_format::to_editable(&guide.content)),
        content: guide.content.clone(),
        created_at: guide.created_at.to_rfc3339(),
        updated_at: guide.updated_at.to_rfc3339(),
    }
}

#[tool_handler]
impl ServerHandler for GuidePortalServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "guide-portal".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Guide portal MCP server for one organization. Use search_guides to browse and \
                 search, get_guide to read a guide, list_categories for category IDs, \
                 save_guide to create or edit, set_pinned and delete_guide for admin actions, \
                 preview_content to see how content will be stored and rendered, and \
                 portal_status to check permissions and live updates."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use portal_common::memory::InMemoryGuideService;
    use portal_common::remote::GuideService;

    use super::*;
    use crate::dashboard::DashboardSettings;
    use crate::session::{Access, Session};

    async fn server(access: Access) -> GuidePortalServer {
        let remote = Arc::new(InMemoryGuideService::new());
        let org = remote.register_organization("Acme", false);
        let session = Session {
            organization_id: org.id,
            user_id: Some("u1".to_string()),
            access,
        };
        let dashboard = Dashboard::open(
            remote as Arc<dyn GuideService>,
            session,
            DashboardSettings::default(),
        )
        .await;
        GuidePortalServer::new(Arc::new(dashboard), RedisStore::new(None, "guide-portal:"))
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = GuidePortalServer::tool_router().list_all();
        for name in [
            "search_guides",
            "get_guide",
            "list_categories",
            "save_guide",
            "set_pinned",
            "delete_guide",
            "preview_content",
            "portal_status",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn saved_guides_show_up_in_search() {
        let server = server(Access::Member).await;
        let Json(saved) = server
            .save_guide(Parameters(SaveGuideParams {
                guide_id: None,
                title: "VPN setup".to_string(),
                content: "<p>Install the <b>client</b></p>".to_string(),
                category_id: None,
            }))
            .await
            .unwrap();
        assert_eq!(saved.content, "Install the **client**");
        assert!(saved.html.contains("<strong>client</strong>"));

        let Json(found) = server
            .search_guides(Parameters(SearchGuidesParams {
                query: Some("vpn".to_string()),
                category: None,
                page: None,
            }))
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.guides[0].id, saved.id);
        assert_eq!(found.guides[0].category, "Uncategorized");
        assert!(found.stale_error.is_none());
    }

    #[tokio::test]
    async fn members_cannot_delete() {
        let server = server(Access::Member).await;
        let result = server
            .delete_guide(Parameters(DeleteGuideParams {
                guide_id: "g1".to_string(),
            }))
            .await;
        match result {
            Ok(_) => panic!("members must not delete guides"),
            Err(err) => assert!(err.contains("permission denied"), "{err}"),
        }
    }

    #[tokio::test]
    async fn preview_converts_html() {
        let server = server(Access::Guest { can_write: false }).await;
        let Json(preview) = server
            .preview_content(Parameters(PreviewContentParams {
                content: "<h1>Title</h1><p>Some <em>text</em></p>".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(preview.canonical, "# Title\n\nSome *text*");
        assert_eq!(preview.summary, "Title Some text");
    }

    #[tokio::test]
    async fn status_reports_session() {
        let server = server(Access::Guest { can_write: true }).await;
        let Json(status) = server.portal_status().await.unwrap();
        assert_eq!(status.role, "guest");
        assert!(status.can_edit);
        assert!(!status.can_manage);
        assert!(status.live_updates);
        assert!(!status.redis_available);
    }
}
