//! Creational contexts: the arena that tracks one creation tree.
//!
//! The owner of a creation tree is entry 0 of an arena. Dependent objects
//! created while building the owner are pushed as further entries that link
//! to the entry that requested them. An entry is pushed before its instance
//! is injected, so a back-reference to a partially built instance can be
//! found by walking the parent links.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{AnyArc, BeanDefinition, BeanId, InjectionPoint};
use crate::error::{BeanError, BeanResult};

type DestroyHook = Box<dyn FnOnce(&AnyArc) -> BeanResult<()> + Send>;

/// Lifecycle of one instance. Transitions are strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Allocated, not yet injected.
    Created,
    Injected,
    PostConstructed,
    /// Handed out to clients.
    Active,
    PreDestroyed,
    Destroyed,
}

impl LifecycleState {
    pub fn next(self) -> Option<LifecycleState> {
        use LifecycleState::*;
        match self {
            Created => Some(Injected),
            Injected => Some(PostConstructed),
            PostConstructed => Some(Active),
            Active => Some(PreDestroyed),
            PreDestroyed => Some(Destroyed),
            Destroyed => None,
        }
    }
}

/// Result of looking for an in-flight creation of a bean.
pub(crate) enum InFlight {
    /// The instance is allocated and may be handed out as a back-reference.
    Allocated(AnyArc),
    /// The bean is still inside its constructor.
    Constructing,
}

struct Entry {
    serial: u64,
    bean: Option<Arc<BeanDefinition>>,
    parent: Option<usize>,
    instance: Option<AnyArc>,
    state: Option<LifecycleState>,
    destroy: Option<DestroyHook>,
    injection_point: Option<InjectionPoint>,
    delegate: Option<AnyArc>,
    released: bool,
}

impl Entry {
    fn new(serial: u64, bean: Option<Arc<BeanDefinition>>, parent: Option<usize>) -> Self {
        Self {
            serial,
            bean,
            parent,
            instance: None,
            state: None,
            destroy: None,
            injection_point: None,
            delegate: None,
            released: false,
        }
    }

    fn label(&self) -> String {
        self.bean
            .as_ref()
            .map(|b| b.display())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

struct Arena {
    entries: Vec<Entry>,
    next_serial: u64,
    /// The creation that caused this tree to be built, searched for
    /// back-references only. Never released from here.
    outer: Option<CreationalContext>,
}

impl Arena {
    fn entry(&self, index: usize, serial: u64) -> Option<&Entry> {
        self.entries.get(index).filter(|e| e.serial == serial)
    }

    fn entry_mut(&mut self, index: usize, serial: u64) -> Option<&mut Entry> {
        self.entries.get_mut(index).filter(|e| e.serial == serial)
    }

    fn push(&mut self, bean: Option<Arc<BeanDefinition>>, parent: Option<usize>) -> (usize, u64) {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.push(Entry::new(serial, bean, parent));
        (self.entries.len() - 1, serial)
    }

    /// Drops released entries from the end. The owner entry stays.
    fn reclaim(&mut self) {
        while self.entries.len() > 1 && self.entries.last().map_or(false, |e| e.released) {
            self.entries.pop();
        }
    }
}

/// Handle onto one entry of a creation arena
///
/// Cloning the handle is cheap; all clones refer to the same arena. A
/// context is confined to the thread performing the creation, but it may be
/// stored by a scope context and released from another thread later.
///
/// Released entries give up their instance at once. Slots at the end of the
/// arena are reused, so a handle to a reclaimed entry reads as empty and
/// releasing it again does nothing.
#[derive(Clone)]
pub struct CreationalContext {
    arena: Arc<Mutex<Arena>>,
    index: usize,
    serial: u64,
}

impl CreationalContext {
    /// Starts a new creation tree owned by `bean`.
    pub fn owner(bean: Option<Arc<BeanDefinition>>) -> Self {
        let mut arena = Arena {
            entries: Vec::new(),
            next_serial: 0,
            outer: None,
        };
        let (index, serial) = arena.push(bean, None);
        Self {
            arena: Arc::new(Mutex::new(arena)),
            index,
            serial,
        }
    }

    /// Starts a new creation tree that can see in-flight instances of `outer`.
    pub(crate) fn owner_within(bean: Option<Arc<BeanDefinition>>, outer: Option<&CreationalContext>) -> Self {
        let cc = Self::owner(bean);
        cc.arena.lock().outer = outer.cloned();
        cc
    }

    /// Drops the link to the triggering creation once this tree is complete.
    pub(crate) fn detach_outer(&self) {
        self.arena.lock().outer = None;
    }

    /// Pushes a dependent entry for `bean` below this one. Below a reclaimed
    /// entry the new one hangs off the owner.
    pub fn child(&self, bean: Arc<BeanDefinition>) -> CreationalContext {
        let mut arena = self.arena.lock();
        let parent = if arena.entry(self.index, self.serial).is_some() {
            self.index
        } else {
            0
        };
        let (index, serial) = arena.push(Some(bean), Some(parent));
        CreationalContext {
            arena: self.arena.clone(),
            index,
            serial,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.index == 0
    }

    /// The owner entry of this arena.
    pub fn owner_context(&self) -> CreationalContext {
        let serial = self.arena.lock().entries[0].serial;
        CreationalContext {
            arena: self.arena.clone(),
            index: 0,
            serial,
        }
    }

    pub fn bean(&self) -> Option<Arc<BeanDefinition>> {
        self.arena.lock().entry(self.index, self.serial)?.bean.clone()
    }

    pub fn instance(&self) -> Option<AnyArc> {
        self.arena.lock().entry(self.index, self.serial)?.instance.clone()
    }

    /// `None` before the instance was pushed, and once the entry was
    /// reclaimed.
    pub fn state(&self) -> Option<LifecycleState> {
        self.arena.lock().entry(self.index, self.serial)?.state
    }

    /// Records the allocated instance and enters `Created`.
    pub fn push(&self, instance: AnyArc) {
        let mut arena = self.arena.lock();
        if let Some(entry) = arena.entry_mut(self.index, self.serial) {
            entry.instance = Some(instance);
            entry.state = Some(LifecycleState::Created);
        }
    }

    /// Moves to `to`, which must be the direct successor of the current state.
    pub fn advance(&self, to: LifecycleState) -> BeanResult<()> {
        let mut arena = self.arena.lock();
        let Some(entry) = arena.entry_mut(self.index, self.serial) else {
            return Err(BeanError::IllegalState(format!(
                "released creational context cannot move to {:?}",
                to
            )));
        };
        match entry.state {
            Some(current) if current.next() == Some(to) => {
                entry.state = Some(to);
                Ok(())
            }
            current => Err(BeanError::IllegalState(format!(
                "{} cannot move from {:?} to {:?}",
                entry.label(),
                current,
                to
            ))),
        }
    }

    /// Installs the hook run when this entry is destroyed.
    pub(crate) fn on_destroy(&self, hook: DestroyHook) {
        if let Some(entry) = self.arena.lock().entry_mut(self.index, self.serial) {
            entry.destroy = Some(hook);
        }
    }

    pub(crate) fn set_injection_point(&self, ip: InjectionPoint) {
        if let Some(entry) = self.arena.lock().entry_mut(self.index, self.serial) {
            entry.injection_point = Some(ip);
        }
    }

    /// The injection point this entry is being injected into.
    pub fn injection_point(&self) -> Option<InjectionPoint> {
        let arena = self.arena.lock();
        arena.entry(self.index, self.serial)?;
        let mut idx = Some(self.index);
        while let Some(i) = idx {
            if let Some(ip) = &arena.entries[i].injection_point {
                return Some(ip.clone());
            }
            // built-ins resolved inside an anonymous entry look at their parent
            if arena.entries[i].bean.is_some() {
                return None;
            }
            idx = arena.entries[i].parent;
        }
        None
    }

    pub(crate) fn set_delegate(&self, delegate: AnyArc) {
        if let Some(entry) = self.arena.lock().entry_mut(self.index, self.serial) {
            entry.delegate = Some(delegate);
        }
    }

    /// The delegate of the decorator being built, searched up the chain.
    pub(crate) fn delegate(&self) -> Option<AnyArc> {
        let arena = self.arena.lock();
        arena.entry(self.index, self.serial)?;
        let mut idx = Some(self.index);
        while let Some(i) = idx {
            if let Some(d) = &arena.entries[i].delegate {
                return Some(d.clone());
            }
            idx = arena.entries[i].parent;
        }
        None
    }

    /// Looks for an in-flight creation of `id` among this entry's ancestors,
    /// then in the creation that triggered this arena.
    pub(crate) fn find_in_flight(&self, id: BeanId) -> Option<InFlight> {
        let outer = {
            let arena = self.arena.lock();
            let mut idx = arena.entry(self.index, self.serial).map(|_| self.index);
            while let Some(i) = idx {
                let entry = &arena.entries[i];
                if entry.bean.as_ref().map(|b| b.id()) == Some(id) {
                    return Some(match &entry.instance {
                        Some(inst) => InFlight::Allocated(inst.clone()),
                        None => InFlight::Constructing,
                    });
                }
                idx = entry.parent;
            }
            arena.outer.clone()
        };
        outer.and_then(|o| o.find_in_flight(id))
    }

    /// The live entry below this one whose instance is `instance`.
    pub(crate) fn find_descendant(&self, instance: &AnyArc) -> Option<CreationalContext> {
        let arena = self.arena.lock();
        arena.entry(self.index, self.serial)?;
        let is_below = |mut i: usize| loop {
            match arena.entries[i].parent {
                Some(p) if p == self.index => return true,
                Some(p) => i = p,
                None => return false,
            }
        };
        (self.index + 1..arena.entries.len())
            .find(|&i| {
                arena.entries[i]
                    .instance
                    .as_ref()
                    .map_or(false, |inst| same_instance(inst, instance))
                    && is_below(i)
            })
            .map(|index| CreationalContext {
                arena: self.arena.clone(),
                index,
                serial: arena.entries[index].serial,
            })
    }

    /// Number of occupied slots in the arena, the owner included.
    pub fn len(&self) -> usize {
        self.arena.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys this entry and every entry created below it, in reverse
    /// creation order. Each entry is destroyed at most once. Failures are
    /// logged and the first one is returned after all entries were tried.
    pub fn release(&self) -> BeanResult<()> {
        let hooks: Vec<(String, AnyArc, DestroyHook)> = {
            let mut arena = self.arena.lock();
            if arena.entry(self.index, self.serial).is_none() {
                return Ok(());
            }
            let n = arena.entries.len();
            let mut in_tree = vec![false; n];
            in_tree[self.index] = true;
            for i in self.index + 1..n {
                if let Some(p) = arena.entries[i].parent {
                    in_tree[i] = in_tree[p];
                }
            }
            let mut hooks = Vec::new();
            for i in (self.index..n).rev() {
                if !in_tree[i] {
                    continue;
                }
                let entry = &mut arena.entries[i];
                let label = entry.label();
                let instance = entry.instance.take();
                if let (Some(hook), Some(instance)) = (entry.destroy.take(), instance) {
                    hooks.push((label, instance, hook));
                }
                entry.injection_point = None;
                entry.delegate = None;
                entry.released = true;
                if entry.state.is_some() {
                    entry.state = Some(LifecycleState::Destroyed);
                }
            }
            arena.reclaim();
            hooks
        };

        let mut first_error = None;
        for (label, instance, hook) in hooks {
            if let Err(err) = hook(&instance) {
                tracing::warn!(target: "ferrous_beans::destroy", bean = %label, error = %err, "destroy failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Identity comparison of two erased instances.
pub(crate) fn same_instance(a: &AnyArc, b: &AnyArc) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.lock();
        f.debug_struct("CreationalContext")
            .field("index", &self.index)
            .field("entries", &arena.entries.len())
            .field(
                "bean",
                &arena
                    .entry(self.index, self.serial)
                    .and_then(|e| e.bean.as_ref())
                    .map(|b| b.display()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanBuilder;

    fn bean(name: &str) -> Arc<BeanDefinition> {
        Arc::new(
            BeanBuilder::new(name)
                .constructor(vec![], |_| Ok(()))
                .build()
                .unwrap(),
        )
    }

    fn tracked(cc: &CreationalContext, name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) {
        cc.push(Arc::new(()));
        let log = log.clone();
        cc.on_destroy(Box::new(move |_| {
            log.lock().push(name);
            Ok(())
        }));
    }

    #[test]
    fn release_runs_in_reverse_with_owner_last() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let owner = CreationalContext::owner(Some(bean("O")));
        let d1 = owner.child(bean("D1"));
        let d2 = owner.child(bean("D2"));
        tracked(&owner, "O", &log);
        tracked(&d1, "D1", &log);
        tracked(&d2, "D2", &log);

        owner.release().unwrap();
        assert_eq!(*log.lock(), vec!["D2", "D1", "O"]);

        // second release is a no-op
        owner.release().unwrap();
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn releasing_a_child_keeps_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let owner = CreationalContext::owner(None);
        let d1 = owner.child(bean("D1"));
        let d1a = d1.child(bean("D1a"));
        let d2 = owner.child(bean("D2"));
        tracked(&d1, "D1", &log);
        tracked(&d1a, "D1a", &log);
        tracked(&d2, "D2", &log);

        d1.release().unwrap();
        assert_eq!(*log.lock(), vec!["D1a", "D1"]);
        assert_eq!(d2.state(), Some(LifecycleState::Created));
    }

    #[test]
    fn released_entries_drop_their_instances_and_slots() {
        let owner = CreationalContext::owner(None);
        let keep = owner.child(bean("Keep"));
        keep.push(Arc::new(0u8));

        for _ in 0..100 {
            let dep = owner.child(bean("Dep"));
            let value: AnyArc = Arc::new(1u32);
            dep.push(value.clone());
            dep.child(bean("Inner")).push(Arc::new(2u32));
            assert_eq!(Arc::strong_count(&value), 2);

            owner.find_descendant(&value).unwrap().release().unwrap();
            assert_eq!(Arc::strong_count(&value), 1);
            assert!(dep.instance().is_none());
            // a stale handle is inert
            dep.release().unwrap();
        }
        assert_eq!(owner.len(), 2);

        // a released slot in the middle is reclaimed once the tail is free
        let middle = owner.child(bean("Middle"));
        let tail = owner.child(bean("Tail"));
        middle.release().unwrap();
        assert_eq!(owner.len(), 4);
        tail.release().unwrap();
        assert_eq!(owner.len(), 2);
        assert!(keep.instance().is_some());
    }

    #[test]
    fn states_cannot_be_skipped() {
        let cc = CreationalContext::owner(Some(bean("X")));
        cc.push(Arc::new(()));
        assert!(cc.advance(LifecycleState::PostConstructed).is_err());
        cc.advance(LifecycleState::Injected).unwrap();
        cc.advance(LifecycleState::PostConstructed).unwrap();
    }

    #[test]
    fn finds_back_references() {
        let a = bean("A");
        let owner = CreationalContext::owner(Some(a.clone()));
        let child = owner.child(bean("B"));
        assert!(matches!(child.find_in_flight(a.id()), Some(InFlight::Constructing)));
        owner.push(Arc::new(1u8));
        assert!(matches!(child.find_in_flight(a.id()), Some(InFlight::Allocated(_))));

        let nested = CreationalContext::owner_within(None, Some(&child));
        assert!(matches!(nested.find_in_flight(a.id()), Some(InFlight::Allocated(_))));
    }
}
