//! Who is looking at the portal and what they may do.

use std::fmt;

use portal_common::access::{is_valid_access_code, normalize_access_code, AccessStore};
use portal_common::model::Role;
use portal_common::remote::GuideService;
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin,
    Member,
    /// Entered with an organization access code.
    Guest { can_write: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Edit,
    Pin,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Pin => "pin",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub organization_id: String,
    pub user_id: Option<String>,
    pub access: Access,
}

impl Session {
    pub fn can(&self, action: Action) -> bool {
        match (self.access, action) {
            (_, Action::View) => true,
            (Access::Admin, _) => true,
            (Access::Member, Action::Create | Action::Edit) => true,
            (Access::Guest { can_write }, Action::Create | Action::Edit) => can_write,
            _ => false,
        }
    }

    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied { action })
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self.access {
            Access::Admin => "admin",
            Access::Member => "member",
            Access::Guest { .. } => "guest",
        }
    }
}

/// A signed-in user resolves through their membership; anyone else needs a
/// stored access code.
pub async fn resolve_session(
    remote: &dyn GuideService,
    user_id: Option<&str>,
    store: &dyn AccessStore,
) -> Result<Session, AppError> {
    if let Some(user_id) = user_id {
        if let Some(membership) = remote.find_membership(user_id).await? {
            let access = match membership.role {
                Role::Admin => Access::Admin,
                Role::Member => Access::Member,
            };
            info!(user_id, organization_id = %membership.organization_id, "resolved member session");
            return Ok(Session {
                organization_id: membership.organization_id,
                user_id: Some(user_id.to_string()),
                access,
            });
        }
        warn!(user_id, "user has no organization membership, trying stored access code");
    }

    let Some(code) = store.load().await else {
        return Err(AppError::AccessRequired);
    };
    match remote.find_organization_by_code(&code).await? {
        Some(org) => {
            info!(organization_id = %org.id, "resolved guest session from stored access code");
            Ok(Session {
                organization_id: org.id,
                user_id: user_id.map(str::to_string),
                access: Access::Guest {
                    can_write: org.allow_guest_write,
                },
            })
        }
        None => {
            warn!("stored access code no longer matches an organization, clearing it");
            store.clear().await;
            Err(AppError::InvalidAccessCode(code))
        }
    }
}

/// Validates a code typed by a guest, resolves its organization and
/// remembers it.
pub async fn enter_access_code(
    remote: &dyn GuideService,
    store: &dyn AccessStore,
    input: &str,
) -> Result<Session, AppError> {
    let code = normalize_access_code(input);
    if !is_valid_access_code(&code) {
        return Err(AppError::InvalidAccessCode(code));
    }
    let org = remote
        .find_organization_by_code(&code)
        .await?
        .ok_or_else(|| AppError::InvalidAccessCode(code.clone()))?;
    store.save(&code).await;
    info!(organization_id = %org.id, "access code accepted");
    Ok(Session {
        organization_id: org.id,
        user_id: None,
        access: Access::Guest {
            can_write: org.allow_guest_write,
        },
    })
}
