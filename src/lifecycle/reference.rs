//! Client proxies for normal-scoped beans.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::bean::{downcast, AnyArc, BeanDefinition};
use crate::context::{ActiveContexts, CreationalContext};
use crate::error::{BeanError, BeanResult};
use crate::lifecycle::LifecycleManager;

/// Supplies client proxies for normal-scoped beans.
///
/// When a provider is installed, references to normal-scoped beans are
/// whatever the provider returns for a [`LazyReference`]. The contextual
/// instance is only created once the proxy calls [`LazyReference::get`],
/// which also lets mutually dependent normal-scoped beans be constructed.
pub trait ProxyProvider: Send + Sync {
    fn proxy(&self, bean: &Arc<BeanDefinition>, target: LazyReference) -> BeanResult<AnyArc>;
}

/// Provider that hands out the [`LazyReference`] itself.
///
/// Clients downcast the reference to `LazyReference` and call `get_as`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LazyReferenceProvider;

impl ProxyProvider for LazyReferenceProvider {
    fn proxy(&self, _bean: &Arc<BeanDefinition>, target: LazyReference) -> BeanResult<AnyArc> {
        Ok(Arc::new(target))
    }
}

/// Deferred access to the contextual instance of a normal-scoped bean.
#[derive(Clone)]
pub struct LazyReference {
    lifecycle: Weak<LifecycleManager>,
    bean: Arc<BeanDefinition>,
    contexts: ActiveContexts,
}

impl LazyReference {
    pub(crate) fn new(lifecycle: Weak<LifecycleManager>, bean: Arc<BeanDefinition>, contexts: ActiveContexts) -> Self {
        Self {
            lifecycle,
            bean,
            contexts,
        }
    }

    pub fn bean(&self) -> &Arc<BeanDefinition> {
        &self.bean
    }

    /// True while the context of the bean's scope is active.
    pub fn is_active(&self) -> bool {
        self.contexts.is_active(self.bean.scope())
    }

    /// The current contextual instance, created if the context holds none.
    pub fn get(&self) -> BeanResult<AnyArc> {
        let lifecycle = self
            .lifecycle
            .upgrade()
            .ok_or_else(|| BeanError::IllegalState("container has been shut down".to_string()))?;
        let cc = CreationalContext::owner(None);
        lifecycle.contextual(&self.bean, &cc, &self.contexts)
    }

    pub fn get_as<T: Any + Send + Sync>(&self) -> BeanResult<Arc<T>> {
        downcast(self.get()?, self.bean.bean_class())
    }
}

impl fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReference")
            .field("bean", &self.bean.display())
            .field("active", &self.is_active())
            .finish()
    }
}
