//! Entered contexts of normal scopes.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bean::{downcast, AnyArc, BeanDefinition, Reference};
use crate::context::{ActiveContexts, CreationalContext, InstanceStore, ScopeContext};
use crate::error::{BeanError, BeanResult};
use crate::instance::Instance;
use crate::key::ResolutionKey;
use crate::lifecycle::LifecycleManager;
use crate::qualifier::Qualifier;
use crate::scope::ScopeKind;
use crate::traits::BeanLookupCore;
use crate::types::BaseType;

use super::Container;

/// One entered context of a normal scope, such as a request or a session
///
/// Lookups through the handle see its context on top of every context of
/// the handle it was entered from. Dependent instances looked up through
/// the handle belong to it. Closing the handle destroys those dependents,
/// then every instance of its context; dropping it closes it.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder, ScopeKind};
///
/// struct Cart { items: parking_lot::Mutex<Vec<String>> }
///
/// let container = ContainerBuilder::new()
///     .bean(
///         BeanBuilder::new("Cart")
///             .scope(ScopeKind::Request)
///             .constructor(vec![], |_| Ok(Cart { items: Default::default() })),
///     )
///     .build()
///     .unwrap();
///
/// let first = container.enter_scope(ScopeKind::Request).unwrap();
/// let a = first.get::<Cart>("Cart", &[]).unwrap();
/// let b = first.get::<Cart>("Cart", &[]).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let second = container.enter_scope(ScopeKind::Request).unwrap();
/// assert!(!Arc::ptr_eq(&a, &second.get::<Cart>("Cart", &[]).unwrap()));
///
/// // outside of any request
/// assert!(container.get::<Cart>("Cart", &[]).is_err());
/// ```
pub struct ScopeHandle {
    container: Container,
    store: Arc<InstanceStore>,
    contexts: ActiveContexts,
    cc: CreationalContext,
    closed: AtomicBool,
}

impl ScopeHandle {
    pub(crate) fn enter(container: Container, outer: &ActiveContexts, scope: ScopeKind) -> BeanResult<Self> {
        if !scope.is_normal() || scope.is_container_wide() {
            return Err(BeanError::IllegalState(format!(
                "scope {} cannot be entered; only request, session, conversation and custom scopes can",
                scope
            )));
        }
        let store = Arc::new(InstanceStore::new(scope));
        let contexts = outer.with(store.clone());
        tracing::debug!(target: "ferrous_beans::container", scope = %store.scope(), "scope entered");
        Ok(Self {
            container,
            store,
            contexts,
            cc: CreationalContext::owner(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn scope(&self) -> &ScopeKind {
        self.store.scope()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.store.is_active()
    }

    /// Number of live instances in this handle's context.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn check(&self) -> BeanResult<()> {
        self.container.check()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(BeanError::ContextNotActive(self.scope().name().to_string()));
        }
        Ok(())
    }

    fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.container.inner().lifecycle
    }

    /// Enters a context of another scope nested in this one, e.g. a
    /// conversation inside a session.
    pub fn enter_scope(&self, scope: ScopeKind) -> BeanResult<ScopeHandle> {
        self.check()?;
        ScopeHandle::enter(self.container.clone(), &self.contexts, scope)
    }

    pub fn reference_in(&self, archive: &str, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference> {
        self.check()?;
        let manager = self.container.archive(archive)?;
        let key = ResolutionKey::new(ty.clone(), qualifiers);
        self.lifecycle().lookup(manager, &key, &self.cc, &self.contexts)
    }

    pub fn get_in<T: Any + Send + Sync>(
        &self,
        archive: &str,
        ty: &str,
        qualifiers: &[Qualifier],
    ) -> BeanResult<Arc<T>> {
        let value = self
            .reference_in(archive, &BaseType::from(ty), qualifiers)?
            .ok_or_else(|| BeanError::NullReference(ty.to_string()))?;
        downcast::<T>(value, ty)
    }

    /// A reference to an already resolved bean, obtained in this handle's
    /// contexts.
    pub fn reference_to(&self, bean: &Arc<BeanDefinition>) -> BeanResult<Reference> {
        self.check()?;
        self.lifecycle()
            .reference(bean, None, &self.cc, None, &self.contexts)
    }

    pub fn instance(&self, ty: &str, qualifiers: &[Qualifier]) -> BeanResult<Instance> {
        self.check()?;
        Ok(Instance::new(
            Arc::downgrade(self.lifecycle()),
            self.container.manager().clone(),
            BaseType::from(ty),
            qualifiers.to_vec(),
            self.cc.clone(),
            self.contexts.clone(),
        ))
    }

    /// Fires an event with this handle's contexts active.
    pub fn fire<T: Any + Send + Sync>(
        &self,
        event_type: &str,
        qualifiers: &[Qualifier],
        payload: T,
    ) -> BeanResult<usize> {
        self.check()?;
        let payload: AnyArc = Arc::new(payload);
        self.lifecycle()
            .fire(&BaseType::from(event_type), qualifiers, &payload, &self.contexts)
    }

    /// Destroys a dependent instance obtained through this handle, or the
    /// instance of a bean in this handle's context.
    pub fn destroy(&self, instance: &AnyArc) -> BeanResult<()> {
        if let Some(entry) = self.cc.find_descendant(instance) {
            return entry.release();
        }
        for bean in self.container.beans() {
            if bean.scope() != self.scope() {
                continue;
            }
            if self
                .store
                .get(&bean)
                .map_or(false, |existing| crate::context::same_instance(&existing, instance))
            {
                return self.store.destroy(&bean);
            }
        }
        Err(BeanError::IllegalState(format!(
            "instance was not obtained from this {} handle",
            self.scope()
        )))
    }

    /// Runs `f` with this handle and closes it afterwards, reporting the
    /// first failure of either.
    pub fn using<R, F>(self, f: F) -> BeanResult<R>
    where
        F: FnOnce(&ScopeHandle) -> BeanResult<R>,
    {
        let result = f(&self);
        let closed = self.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Destroys the handle's dependents, then its context. Closing twice does
    /// nothing.
    pub fn close(&self) -> BeanResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let released = self.cc.release();
        let destroyed = self.store.destroy_all();
        tracing::debug!(target: "ferrous_beans::container", scope = %self.scope(), "scope closed");
        released.and(destroyed)
    }
}

impl BeanLookupCore for ScopeHandle {
    fn reference_any(&self, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference> {
        self.check()?;
        let key = ResolutionKey::new(ty.clone(), qualifiers);
        self.lifecycle()
            .lookup(self.container.manager(), &key, &self.cc, &self.contexts)
    }

    fn reference_named(&self, name: &str) -> BeanResult<Reference> {
        self.check()?;
        let bean = self.container.manager().resolve_named(name)?;
        self.lifecycle()
            .reference(&bean, None, &self.cc, None, &self.contexts)
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(target: "ferrous_beans::container", scope = %self.scope(), error = %err, "closing dropped scope failed");
        }
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("scope", self.scope())
            .field("instances", &self.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
