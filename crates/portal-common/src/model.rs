use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label shown for guides without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub organization_id: String,
}

/// A guide as stored remotely. `content` is canonical Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guide {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub organization_id: String,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Guide {
    pub fn category_name(&self) -> &str {
        self.category
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or(UNCATEGORIZED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub unique_code: String,
    #[serde(default)]
    pub allow_guest_write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
}

/// Fields sent when creating or updating a guide.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GuideDraft {
    pub organization_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification that a guide of an organization changed remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideChange {
    pub organization_id: String,
    pub kind: ChangeKind,
    pub guide_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Uncategorized,
    Named(String),
}

impl CategoryFilter {
    /// `"all"` (any case) or blank selects everything, `"Uncategorized"`
    /// selects guides without a category, anything else is a category name.
    pub fn from_param(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            CategoryFilter::All
        } else if value.eq_ignore_ascii_case(UNCATEGORIZED) {
            CategoryFilter::Uncategorized
        } else {
            CategoryFilter::Named(value.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Uncategorized => UNCATEGORIZED,
            CategoryFilter::Named(name) => name,
        }
    }

    pub fn matches(&self, guide: &Guide) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Uncategorized => guide.category.is_none(),
            CategoryFilter::Named(name) => guide
                .category
                .as_ref()
                .is_some_and(|c| &c.name == name),
        }
    }
}

/// Identity of a guide query: organization, trimmed search term and
/// category filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuideQuery {
    pub organization_id: String,
    pub search: String,
    pub category: CategoryFilter,
}

impl GuideQuery {
    pub fn new(organization_id: &str, search: &str, category: CategoryFilter) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            search: search.trim().to_string(),
            category,
        }
    }

    /// Lowercased whitespace-separated terms; all must match.
    pub fn terms(&self) -> Vec<String> {
        self.search
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Pinned first, then most viewed, then newest.
    #[default]
    PinnedViewsNewest,
}

impl SortOrder {
    pub fn compare(&self, a: &Guide, b: &Guide) -> Ordering {
        match self {
            SortOrder::PinnedViewsNewest => b
                .is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.views.cmp(&a.views))
                .then_with(|| b.created_at.cmp(&a.created_at)),
        }
    }
}
