use portal_common::error::{CommonError, RemoteError};

use crate::session::Action;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("permission denied: cannot {action} guides")]
    PermissionDenied { action: Action },

    #[error("invalid guide: {0}")]
    InvalidDraft(String),

    #[error("an access code or signed-in user is required")]
    AccessRequired,

    #[error("invalid access code: {0}")]
    InvalidAccessCode(String),

    #[error("guide not found: {0}")]
    NotFound(String),

    #[error("live guide updates unavailable for organization {0}")]
    SubscriptionLost(String),
}
