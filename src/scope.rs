//! Bean scope definitions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Scopes controlling how long a bean instance is reused
///
/// `Dependent` and `Singleton` are pseudo-scopes: references point straight
/// at the instance. Every other scope is a *normal* scope whose instances
/// live in a context that may be inactive; resolving a normal-scoped bean
/// outside its context fails with
/// [`BeanError::ContextNotActive`](crate::BeanError::ContextNotActive).
///
/// # Scope Characteristics
///
/// - **Dependent**: never cached, destroyed with whatever created it
/// - **Singleton / Application**: one instance per container
/// - **Request / Session / Conversation / Custom**: one instance per entered
///   [`ScopeHandle`](crate::ScopeHandle) of that kind
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::ScopeKind;
///
/// assert!(ScopeKind::Request.is_normal());
/// assert!(!ScopeKind::Dependent.is_normal());
/// assert!(ScopeKind::Session.is_passivating());
/// assert_eq!(ScopeKind::from_name("RequestScoped"), Some(ScopeKind::Request));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// New instance per injection, owned by the creating context
    Dependent,
    /// Single instance per container, no client proxy
    Singleton,
    /// Single instance per container
    Application,
    /// Single instance per request handle
    Request,
    /// Single instance per session handle, passivating
    Session,
    /// Single instance per conversation handle, passivating
    Conversation,
    /// Host-defined normal scope
    Custom { name: Arc<str>, passivating: bool },
}

impl ScopeKind {
    pub fn custom(name: impl Into<Arc<str>>) -> Self {
        ScopeKind::Custom {
            name: name.into(),
            passivating: false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ScopeKind::Dependent => "Dependent",
            ScopeKind::Singleton => "Singleton",
            ScopeKind::Application => "ApplicationScoped",
            ScopeKind::Request => "RequestScoped",
            ScopeKind::Session => "SessionScoped",
            ScopeKind::Conversation => "ConversationScoped",
            ScopeKind::Custom { name, .. } => name,
        }
    }

    /// Maps a scope annotation name onto a built-in scope.
    pub fn from_name(name: &str) -> Option<ScopeKind> {
        match name {
            "Dependent" => Some(ScopeKind::Dependent),
            "Singleton" => Some(ScopeKind::Singleton),
            "ApplicationScoped" => Some(ScopeKind::Application),
            "RequestScoped" => Some(ScopeKind::Request),
            "SessionScoped" => Some(ScopeKind::Session),
            "ConversationScoped" => Some(ScopeKind::Conversation),
            _ => None,
        }
    }

    /// Normal scopes are served through a context and may be proxied.
    pub fn is_normal(&self) -> bool {
        !matches!(self, ScopeKind::Dependent | ScopeKind::Singleton)
    }

    pub fn is_dependent(&self) -> bool {
        matches!(self, ScopeKind::Dependent)
    }

    /// Scopes whose instances may be serialized and restored.
    pub fn is_passivating(&self) -> bool {
        match self {
            ScopeKind::Session | ScopeKind::Conversation => true,
            ScopeKind::Custom { passivating, .. } => *passivating,
            _ => false,
        }
    }

    /// Scopes whose context exists for the whole container lifetime.
    pub fn is_container_wide(&self) -> bool {
        matches!(self, ScopeKind::Singleton | ScopeKind::Application)
    }
}

impl Default for ScopeKind {
    fn default() -> Self {
        ScopeKind::Dependent
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_scopes_are_normal() {
        let scope = ScopeKind::custom("TenantScoped");
        assert!(scope.is_normal());
        assert!(!scope.is_passivating());
        assert_eq!(scope.to_string(), "@TenantScoped");
    }

    #[test]
    fn round_trips_through_names() {
        for scope in [
            ScopeKind::Dependent,
            ScopeKind::Singleton,
            ScopeKind::Application,
            ScopeKind::Request,
            ScopeKind::Session,
            ScopeKind::Conversation,
        ] {
            assert_eq!(ScopeKind::from_name(scope.name()), Some(scope.clone()));
        }
    }
}
