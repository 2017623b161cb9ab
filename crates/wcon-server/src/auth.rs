//! Sessions and the per-command authorization check.
//!
//! Sessions are owned by the external auth subsystem; the relay only reads
//! them, and clears one as a logout side effect when an already-attached
//! session fails the authentication check.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Permission scopes consumed by the relay.
pub mod scopes {
    /// Required to submit commands to the managed process.
    pub const CONSOLE_WRITE: &str = "console.write";
}

/// Authentication state attached to a connection.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    pub authenticated: bool,
    pub username: String,
    pub permissions: HashSet<String>,
}

impl AuthSession {
    /// Build an authenticated session holding the given scopes.
    pub fn with_permissions(username: impl Into<String>, permissions: &[&str]) -> Self {
        Self {
            authenticated: true,
            username: username.into(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Clear authentication state (logout side effect).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Shared handle to an externally owned session.
pub type SharedSession = Arc<RwLock<AuthSession>>;

/// Outcome of the authorization check for one inbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    /// The session exists and is currently authenticated.
    pub valid_auth: bool,
    /// `valid_auth` holds AND the session carries the requested scope.
    pub valid_perm: bool,
}

/// Check whether `session` may perform an action guarded by `scope`.
///
/// An absent session counts as not authenticated.
pub async fn authorize(session: Option<&SharedSession>, scope: &str) -> Authorization {
    let Some(session) = session else {
        return Authorization {
            valid_auth: false,
            valid_perm: false,
        };
    };

    let guard = session.read().await;
    let valid_auth = guard.authenticated;
    Authorization {
        valid_auth,
        valid_perm: valid_auth && guard.permissions.contains(scope),
    }
}

/// Attaches a session to an incoming connection. Owned by the external auth
/// subsystem; the server only consumes the trait.
pub trait SessionResolver: Send + Sync {
    /// Resolve the session for a connection from `remote`, if any.
    fn resolve(&self, remote: &str) -> Option<SharedSession>;
}

/// Development resolver granting the same static session to every
/// connection (from the `[auth]` config section).
pub struct StaticResolver {
    template: AuthSession,
}

impl StaticResolver {
    pub fn new(username: impl Into<String>, permissions: &[String]) -> Self {
        let refs: Vec<&str> = permissions.iter().map(String::as_str).collect();
        Self {
            template: AuthSession::with_permissions(username, &refs),
        }
    }
}

impl SessionResolver for StaticResolver {
    fn resolve(&self, _remote: &str) -> Option<SharedSession> {
        Some(Arc::new(RwLock::new(self.template.clone())))
    }
}

/// Resolver for deployments without an auth subsystem: nobody gets a
/// session, so every command is rejected as unauthenticated.
pub struct DenyAllResolver;

impl SessionResolver for DenyAllResolver {
    fn resolve(&self, _remote: &str) -> Option<SharedSession> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(session: AuthSession) -> SharedSession {
        Arc::new(RwLock::new(session))
    }

    #[tokio::test]
    async fn missing_session_is_unauthenticated() {
        let auth = authorize(None, scopes::CONSOLE_WRITE).await;
        assert!(!auth.valid_auth);
        assert!(!auth.valid_perm);
    }

    #[tokio::test]
    async fn unauthenticated_session_has_no_permissions() {
        let session = shared(AuthSession {
            authenticated: false,
            username: "ghost".into(),
            permissions: [scopes::CONSOLE_WRITE.to_string()].into(),
        });
        let auth = authorize(Some(&session), scopes::CONSOLE_WRITE).await;
        assert!(!auth.valid_auth);
        assert!(!auth.valid_perm);
    }

    #[tokio::test]
    async fn authenticated_without_scope() {
        let session = shared(AuthSession::with_permissions("viewer", &[]));
        let auth = authorize(Some(&session), scopes::CONSOLE_WRITE).await;
        assert!(auth.valid_auth);
        assert!(!auth.valid_perm);
    }

    #[tokio::test]
    async fn authenticated_with_scope() {
        let session = shared(AuthSession::with_permissions(
            "admin",
            &[scopes::CONSOLE_WRITE],
        ));
        let auth = authorize(Some(&session), scopes::CONSOLE_WRITE).await;
        assert!(auth.valid_auth);
        assert!(auth.valid_perm);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let session = shared(AuthSession::with_permissions(
            "admin",
            &[scopes::CONSOLE_WRITE],
        ));
        session.write().await.clear();
        let guard = session.read().await;
        assert!(!guard.authenticated);
        assert!(guard.username.is_empty());
        assert!(guard.permissions.is_empty());
    }
}
