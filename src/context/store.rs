//! Scope contexts backed by per-bean once-cells.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::bean::{AnyArc, BeanDefinition, BeanId};
use crate::context::CreationalContext;
use crate::error::{BeanError, BeanResult};
use crate::internal::CreationGuard;
use crate::scope::ScopeKind;

/// A fully created contextual instance and the tree that owns it.
pub struct Created {
    pub instance: AnyArc,
    pub context: CreationalContext,
}

/// Storage for the instances of one scope
///
/// Concurrent `get_or_create` calls for the same bean are serialized: one
/// thread runs the creation, the others block until it completes and then
/// observe the same instance. A failed creation leaves the slot empty so a
/// later call retries.
pub trait ScopeContext: Send + Sync {
    fn scope(&self) -> &ScopeKind;

    fn is_active(&self) -> bool;

    /// The cached instance, if one exists.
    fn get(&self, bean: &BeanDefinition) -> Option<AnyArc>;

    fn get_or_create(
        &self,
        bean: &Arc<BeanDefinition>,
        create: &mut dyn FnMut() -> BeanResult<Created>,
    ) -> BeanResult<AnyArc>;

    /// Destroys the instance of `bean`, if any.
    fn destroy(&self, bean: &BeanDefinition) -> BeanResult<()>;

    /// Destroys every instance in reverse creation order and deactivates the
    /// context.
    fn destroy_all(&self) -> BeanResult<()>;
}

struct Slot {
    cell: OnceCell<AnyArc>,
    context: Mutex<Option<CreationalContext>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            context: Mutex::new(None),
        }
    }
}

/// The [`ScopeContext`] used for every built-in scope.
pub struct InstanceStore {
    scope: ScopeKind,
    active: AtomicBool,
    slots: RwLock<AHashMap<BeanId, Arc<Slot>>>,
    order: Mutex<Vec<(BeanId, String)>>,
}

impl InstanceStore {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            active: AtomicBool::new(true),
            slots: RwLock::new(AHashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    fn slot(&self, id: BeanId) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(&id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|s| s.cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release_slot(&self, id: BeanId, label: &str, slot: &Slot) -> BeanResult<()> {
        let context = slot.context.lock().take();
        match context {
            Some(cc) => {
                tracing::debug!(target: "ferrous_beans::context", scope = %self.scope, bean = %label, "destroying instance");
                cc.release()
            }
            None => {
                tracing::trace!(target: "ferrous_beans::context", bean = id.as_u64(), "no creational context to release");
                Ok(())
            }
        }
    }
}

impl ScopeContext for InstanceStore {
    fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn get(&self, bean: &BeanDefinition) -> Option<AnyArc> {
        self.slots
            .read()
            .get(&bean.id())
            .and_then(|s| s.cell.get().cloned())
    }

    fn get_or_create(
        &self,
        bean: &Arc<BeanDefinition>,
        create: &mut dyn FnMut() -> BeanResult<Created>,
    ) -> BeanResult<AnyArc> {
        if !self.is_active() {
            return Err(BeanError::ContextNotActive(self.scope.name().to_string()));
        }
        let slot = self.slot(bean.id());
        if let Some(instance) = slot.cell.get() {
            return Ok(instance.clone());
        }

        // a same-thread re-entry would block forever inside the cell
        let _guard = CreationGuard::enter(bean.id(), &bean.display())?;
        let instance = slot.cell.get_or_try_init(|| {
            let created = create()?;
            created.context.detach_outer();
            *slot.context.lock() = Some(created.context);
            self.order.lock().push((bean.id(), bean.display()));
            Ok::<_, BeanError>(created.instance)
        })?;
        Ok(instance.clone())
    }

    fn destroy(&self, bean: &BeanDefinition) -> BeanResult<()> {
        let slot = self.slots.write().remove(&bean.id());
        self.order.lock().retain(|(id, _)| *id != bean.id());
        match slot {
            Some(slot) => self.release_slot(bean.id(), &bean.display(), &slot),
            None => Ok(()),
        }
    }

    fn destroy_all(&self) -> BeanResult<()> {
        self.active.store(false, Ordering::Release);
        let order = std::mem::take(&mut *self.order.lock());
        let mut slots = std::mem::take(&mut *self.slots.write());

        let mut first_error = None;
        for (id, label) in order.into_iter().rev() {
            if let Some(slot) = slots.remove(&id) {
                if let Err(err) = self.release_slot(id, &label, &slot) {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .field("instances", &self.len())
            .finish()
    }
}
