//! The set of scope contexts visible to one lookup.

use std::fmt;
use std::sync::Arc;

use crate::context::ScopeContext;
use crate::error::{BeanError, BeanResult};
use crate::scope::ScopeKind;

/// Scope contexts visible from a container or scope handle.
///
/// Later entries shadow earlier ones, so a nested request handle sees its
/// own request context before the one of an enclosing handle.
#[derive(Clone, Default)]
pub struct ActiveContexts {
    contexts: Vec<Arc<dyn ScopeContext>>,
}

impl ActiveContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this set with `context` added on top.
    pub fn with(&self, context: Arc<dyn ScopeContext>) -> Self {
        let mut contexts = self.contexts.clone();
        contexts.push(context);
        Self { contexts }
    }

    pub(crate) fn push(&mut self, context: Arc<dyn ScopeContext>) {
        self.contexts.push(context);
    }

    /// The active context for `scope`.
    pub fn get(&self, scope: &ScopeKind) -> BeanResult<Arc<dyn ScopeContext>> {
        self.contexts
            .iter()
            .rev()
            .find(|c| c.scope() == scope && c.is_active())
            .cloned()
            .ok_or_else(|| BeanError::ContextNotActive(scope.name().to_string()))
    }

    pub fn is_active(&self, scope: &ScopeKind) -> bool {
        self.get(scope).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ScopeContext>> {
        self.contexts.iter()
    }
}

impl fmt::Debug for ActiveContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.contexts.iter().map(|c| c.scope().name().to_string()))
            .finish()
    }
}
