//! Project access interface.

use async_trait::async_trait;

/// The caller a query is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The project no longer exists; its events are stale.
    #[error("No such project: {0}")]
    ProjectNotFound(String),

    #[error("Cannot check project access: {0}")]
    Backend(String),
}

/// Decides whether a caller may see a project's events.
#[async_trait]
pub trait ProjectAccess: Send + Sync {
    async fn check(&self, project: &str, principal: &Principal) -> Result<Visibility, AccessError>;
}
