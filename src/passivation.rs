//! Serializable handles to passivation-capable beans.
//!
//! A [`BeanHandle`] records the passivation id of a bean instead of the
//! instance. After deserializing, the host re-attaches the handle to a live
//! scope, which resolves the bean again by its id and returns the instance
//! current in that scope.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bean::{downcast, BeanDefinition, Reference};
use crate::container::{Container, ScopeHandle};
use crate::error::{BeanError, BeanResult};

/// Durable reference to a bean
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BeanBuilder, BeanHandle, BeanLookup, ContainerBuilder, ScopeKind};
///
/// struct Preferences { theme: String }
///
/// let container = ContainerBuilder::new()
///     .bean(
///         BeanBuilder::new("Preferences")
///             .scope(ScopeKind::Session)
///             .passivation_capable()
///             .constructor(vec![], |_| Ok(Preferences { theme: "dark".into() })),
///     )
///     .build()
///     .unwrap();
///
/// let session = container.enter_scope(ScopeKind::Session).unwrap();
/// let prefs = session.get::<Preferences>("Preferences", &[]).unwrap();
///
/// let bean = container.resolve("Preferences", &[]).unwrap();
/// let json = serde_json::to_string(&BeanHandle::for_bean(&bean).unwrap()).unwrap();
///
/// let handle: BeanHandle = serde_json::from_str(&json).unwrap();
/// let again = handle.reattach_as::<Preferences>(&session).unwrap();
/// assert!(Arc::ptr_eq(&prefs, &again));
/// assert_eq!(again.theme, "dark");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeanHandle {
    passivation_id: String,
    archive: String,
    bean: String,
}

impl BeanHandle {
    /// A handle for `bean`. Fails unless the bean is passivation capable or
    /// normal-scoped.
    pub fn for_bean(bean: &BeanDefinition) -> BeanResult<Self> {
        if !bean.is_passivation_capable() && !bean.scope().is_normal() {
            return Err(BeanError::IllegalState(format!(
                "{} is not passivation capable",
                bean.display()
            )));
        }
        Ok(Self {
            passivation_id: bean.passivation_id().to_string(),
            archive: bean.archive().to_string(),
            bean: bean.display(),
        })
    }

    pub fn passivation_id(&self) -> &str {
        &self.passivation_id
    }

    pub fn archive(&self) -> &str {
        &self.archive
    }

    /// Display string of the bean when the handle was created.
    pub fn bean(&self) -> &str {
        &self.bean
    }

    /// Finds the bean again in `container`.
    pub fn resolve(&self, container: &Container) -> BeanResult<Arc<BeanDefinition>> {
        container.check()?;
        container
            .archive(&self.archive)?
            .bean_by_passivation_id(&self.passivation_id)
            .ok_or_else(|| BeanError::Unsatisfied {
                requested: format!("passivated bean {} ({})", self.bean, self.passivation_id),
            })
    }

    /// The reference current in `scope`.
    pub fn reattach(&self, scope: &ScopeHandle) -> BeanResult<Reference> {
        let bean = self.resolve(scope.container())?;
        tracing::debug!(target: "ferrous_beans::passivation", bean = %bean.display(), scope = %scope.scope(), "reattached");
        scope.reference_to(&bean)
    }

    pub fn reattach_as<T: Any + Send + Sync>(&self, scope: &ScopeHandle) -> BeanResult<Arc<T>> {
        let value = self
            .reattach(scope)?
            .ok_or_else(|| BeanError::NullReference(self.bean.clone()))?;
        downcast::<T>(value, &self.bean)
    }
}
