use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Who the cart belongs to. The storage key namespaces the persisted
/// snapshot so anonymous and signed-in carts never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User { id: u64 },
}

impl Identity {
    pub fn storage_key(&self) -> String {
        match self {
            Identity::Anonymous => "anonymous".to_string(),
            Identity::User { id } => format!("user:{id}"),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User { .. })
    }
}

/// Current identity plus the bearer token attached to authenticated
/// requests. Clones share the cached admin hint.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    token: Option<String>,
    admin_hint: Arc<AtomicBool>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            identity: Identity::Anonymous,
            token: None,
            admin_hint: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn authenticated(user_id: u64, token: impl Into<String>) -> Self {
        Self {
            identity: Identity::User { id: user_id },
            token: Some(token.into()),
            admin_hint: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Cached admin flag for display latency only. Authorization decisions
    /// must always round-trip to the backend.
    pub fn admin_hint(&self) -> bool {
        self.admin_hint.load(Ordering::Relaxed)
    }

    pub fn set_admin_hint(&self, is_admin: bool) {
        self.admin_hint.store(is_admin, Ordering::Relaxed);
    }
}
