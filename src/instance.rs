//! The `Instance<T>` programmatic lookup handle.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::bean::{downcast, downcast_trait, AnyArc, BeanDefinition, Reference};
use crate::context::{same_instance, ActiveContexts, CreationalContext};
use crate::error::{BeanError, BeanResult};
use crate::event::merge_qualifiers;
use crate::key::ResolutionKey;
use crate::lifecycle::{LazyReference, LifecycleManager};
use crate::qualifier::Qualifier;
use crate::resolver::BeanManager;
use crate::types::BaseType;

/// Lookup of beans of one type and qualifier set, performed on demand.
///
/// Dependent instances obtained through the handle belong to the bean the
/// handle was injected into and are destroyed with it, or earlier through
/// [`Instance::destroy`].
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder, Instance, Qualifier};
///
/// struct Codec(&'static str);
///
/// let container = ContainerBuilder::new()
///     .bean(BeanBuilder::new("Json").types(&["Codec"]).constructor(vec![], |_| Ok(Codec("json"))))
///     .bean(
///         BeanBuilder::new("Xml")
///             .types(&["Codec"])
///             .qualifier(Qualifier::new("Legacy"))
///             .constructor(vec![], |_| Ok(Codec("xml"))),
///     )
///     .build()
///     .unwrap();
///
/// let codecs = container.get::<Instance>("Instance<Codec>", &[Qualifier::any()]).unwrap();
/// assert!(codecs.is_ambiguous());
/// assert_eq!(codecs.iter().count(), 2);
///
/// let legacy = codecs.select(&[Qualifier::new("Legacy")]);
/// assert_eq!(legacy.get::<Codec>().unwrap().0, "xml");
/// ```
#[derive(Clone)]
pub struct Instance {
    lifecycle: Weak<LifecycleManager>,
    manager: Arc<BeanManager>,
    ty: BaseType,
    qualifiers: Vec<Qualifier>,
    cc: CreationalContext,
    contexts: ActiveContexts,
}

impl Instance {
    pub(crate) fn new(
        lifecycle: Weak<LifecycleManager>,
        manager: Arc<BeanManager>,
        ty: BaseType,
        qualifiers: Vec<Qualifier>,
        cc: CreationalContext,
        contexts: ActiveContexts,
    ) -> Self {
        Self {
            lifecycle,
            manager,
            ty,
            qualifiers,
            cc,
            contexts,
        }
    }

    pub fn ty(&self) -> &BaseType {
        &self.ty
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    fn key(&self) -> ResolutionKey {
        ResolutionKey::new(self.ty.clone(), &self.qualifiers)
    }

    fn lifecycle(&self) -> BeanResult<Arc<LifecycleManager>> {
        self.lifecycle
            .upgrade()
            .ok_or_else(|| BeanError::IllegalState("container has been shut down".to_string()))
    }

    /// A handle narrowed by `qualifiers`.
    pub fn select(&self, qualifiers: &[Qualifier]) -> Instance {
        let mut selected = self.clone();
        selected.qualifiers = merge_qualifiers(&self.qualifiers, qualifiers);
        selected
    }

    /// A handle for a subtype of this handle's type.
    pub fn select_type(&self, ty: BaseType, qualifiers: &[Qualifier]) -> BeanResult<Instance> {
        let hierarchy = self.manager.hierarchy();
        if !hierarchy
            .closure(&ty)
            .iter()
            .any(|t| self.ty.is_assignable_from(t, hierarchy.as_ref()))
        {
            return Err(BeanError::IllegalState(format!(
                "{} is not a subtype of {}",
                ty, self.ty
            )));
        }
        let mut selected = self.select(qualifiers);
        selected.ty = ty;
        Ok(selected)
    }

    /// The bean the handle currently resolves to.
    pub fn resolve(&self) -> BeanResult<Arc<BeanDefinition>> {
        self.manager.resolve(&self.key())
    }

    pub fn is_unsatisfied(&self) -> bool {
        matches!(self.resolve(), Err(BeanError::Unsatisfied { .. }))
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.resolve(), Err(BeanError::Ambiguous { .. }))
    }

    pub fn is_resolvable(&self) -> bool {
        self.resolve().is_ok()
    }

    /// A reference to the resolved bean.
    pub fn get_reference(&self) -> BeanResult<Reference> {
        let lifecycle = self.lifecycle()?;
        lifecycle.lookup(&self.manager, &self.key(), &self.cc, &self.contexts)
    }

    pub fn get<T: Any + Send + Sync>(&self) -> BeanResult<Arc<T>> {
        let reference = self
            .get_reference()?
            .ok_or_else(|| BeanError::NullReference(self.ty.to_string()))?;
        downcast(reference, &self.ty.to_string())
    }

    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> BeanResult<Arc<T>> {
        let reference = self
            .get_reference()?
            .ok_or_else(|| BeanError::NullReference(self.ty.to_string()))?;
        downcast_trait(reference, &self.ty.to_string())
    }

    /// References to every enabled bean matching the handle, in resolution
    /// order. Each reference is obtained when the iterator reaches it.
    pub fn iter(&self) -> impl Iterator<Item = BeanResult<Reference>> + '_ {
        let beans = self.manager.lookup(&self.key());
        beans.into_iter().map(move |bean| -> BeanResult<Reference> {
            let lifecycle = self.lifecycle()?;
            lifecycle.reference(&bean, Some(&self.key()), &self.cc, None, &self.contexts)
        })
    }

    /// Destroys an instance obtained from this handle.
    ///
    /// Dependent instances are released with their own dependents. For
    /// normal-scoped beans the contextual instance is removed from its
    /// context.
    pub fn destroy(&self, instance: &AnyArc) -> BeanResult<()> {
        if let Some(entry) = self.cc.find_descendant(instance) {
            return entry.release();
        }
        if let Some(lazy) = instance.downcast_ref::<LazyReference>() {
            let store = self.contexts.get(lazy.bean().scope())?;
            return store.destroy(lazy.bean());
        }
        for bean in self.manager.lookup(&self.key()) {
            if bean.scope().is_dependent() {
                continue;
            }
            let Ok(store) = self.contexts.get(bean.scope()) else {
                continue;
            };
            if store.get(&bean).map_or(false, |existing| same_instance(&existing, instance)) {
                return store.destroy(&bean);
            }
        }
        Err(BeanError::IllegalState(format!(
            "instance was not obtained from Instance<{}>",
            self.ty
        )))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("ty", &self.ty)
            .field("qualifiers", &self.qualifiers)
            .field("archive", self.manager.archive())
            .finish()
    }
}
