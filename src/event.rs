//! Observer methods and the `Event<T>` firing handle.
//!
//! An observer method is selected for an event when its observed type is
//! assignable from the event type and each of its qualifiers matches one of
//! the event's qualifiers. Observers without qualifiers see every event of
//! their type. Selected observers run synchronously in ascending priority.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::bean::{target, AnyArc, Arguments, BeanDefinition, InjectionPoint};
use crate::context::{ActiveContexts, CreationalContext};
use crate::error::{BeanError, BeanResult};
use crate::interception::Intercepted;
use crate::lifecycle::LifecycleManager;
use crate::qualifier::{Qualifier, QualifierMatcher};
use crate::types::{BaseType, TypeHierarchy};

/// Priority of observers that declare none.
pub const DEFAULT_OBSERVER_PRIORITY: i32 = 2500;

/// Delivers an event: receiver (none for static observers), payload and
/// the observer's remaining resolved parameters.
pub type NotifyFn = Arc<dyn Fn(Option<&AnyArc>, &AnyArc, Arguments) -> BeanResult<()> + Send + Sync>;

/// A method with an observed event parameter.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use ferrous_beans::{BaseType, BeanLookup, ContainerBuilder, Event, ObserverMethod};
///
/// struct OrderPlaced(u32);
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let sink = seen.clone();
/// let container = ContainerBuilder::new()
///     .observer_method(
///         ObserverMethod::new("Audit.onOrder", BaseType::from("OrderPlaced"))
///             .notify_static(move |order: &OrderPlaced, _args| {
///                 sink.fetch_add(order.0 as usize, Ordering::SeqCst);
///                 Ok(())
///             }),
///     )
///     .build()
///     .unwrap();
///
/// let events = container.get::<Event>("Event<OrderPlaced>", &[]).unwrap();
/// events.fire(OrderPlaced(3)).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 3);
/// ```
#[derive(Clone)]
pub struct ObserverMethod {
    pub(crate) declaring: Option<Arc<BeanDefinition>>,
    pub(crate) member: String,
    pub(crate) event_type: BaseType,
    pub(crate) qualifiers: Vec<Qualifier>,
    pub(crate) priority: i32,
    pub(crate) conditional: bool,
    pub(crate) params: Vec<InjectionPoint>,
    pub(crate) notify: Option<NotifyFn>,
}

impl ObserverMethod {
    pub fn new(member: impl Into<String>, event_type: BaseType) -> Self {
        Self {
            declaring: None,
            member: member.into(),
            event_type,
            qualifiers: Vec::new(),
            priority: DEFAULT_OBSERVER_PRIORITY,
            conditional: false,
            params: Vec::new(),
            notify: None,
        }
    }

    /// The bean the observer is declared on. Static observers have none.
    pub fn declared_by(mut self, bean: Arc<BeanDefinition>) -> Self {
        self.declaring = Some(bean);
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only notify an already existing receiver instance.
    pub fn if_exists(mut self) -> Self {
        self.conditional = true;
        self
    }

    /// An additional injected parameter.
    pub fn param(mut self, point: InjectionPoint) -> Self {
        self.params.push(point);
        self
    }

    /// Observer invoked on a receiver of type `D` for payloads of type `E`.
    pub fn notify<D, E, F>(mut self, notify: F) -> Self
    where
        D: Any + Send + Sync,
        E: Any + Send + Sync,
        F: Fn(&D, &E, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        let member = self.member.clone();
        self.notify = Some(Arc::new(move |receiver, payload, args| {
            let receiver = receiver.ok_or_else(|| {
                BeanError::IllegalState(format!("{} requires a declaring instance", member))
            })?;
            notify(target::<D>(receiver, &member)?, target::<E>(payload, &member)?, args)
        }));
        self
    }

    pub fn notify_static<E, F>(mut self, notify: F) -> Self
    where
        E: Any + Send + Sync,
        F: Fn(&E, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        let member = self.member.clone();
        self.notify = Some(Arc::new(move |_, payload, args| {
            notify(target::<E>(payload, &member)?, args)
        }));
        self
    }

    pub fn notify_raw<F>(mut self, notify: F) -> Self
    where
        F: Fn(Option<&AnyArc>, &AnyArc, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        self.notify = Some(Arc::new(notify));
        self
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn event_type(&self) -> &BaseType {
        &self.event_type
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn declaring(&self) -> Option<&Arc<BeanDefinition>> {
        self.declaring.as_ref()
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.params
    }

    /// True if this observer is notified of an event of `event_type` with
    /// `qualifiers`.
    pub fn observes(&self, event_type: &BaseType, qualifiers: &[Qualifier], hierarchy: &dyn TypeHierarchy) -> bool {
        hierarchy
            .closure(event_type)
            .iter()
            .any(|t| self.event_type.is_assignable_from(t, hierarchy))
            && self.qualifiers.iter().all(|required| {
                required.is_any()
                    || qualifiers
                        .iter()
                        .any(|q| QualifierMatcher::is_match(required, q))
            })
    }

    /// Delivers `payload`. Returns false when a conditional observer was
    /// skipped.
    fn deliver(
        &self,
        lifecycle: &Arc<LifecycleManager>,
        payload: &AnyArc,
        contexts: &ActiveContexts,
    ) -> BeanResult<bool> {
        let notify = self.notify.as_ref().ok_or_else(|| {
            BeanError::Definition(format!("observer {} has no body", self.member))
        })?;
        let cc = CreationalContext::owner(None);
        let result = (|| -> BeanResult<bool> {
            let receiver = match &self.declaring {
                Some(declaring) if self.conditional => {
                    let existing = contexts
                        .get(declaring.scope())
                        .ok()
                        .and_then(|store| store.get(declaring));
                    match existing {
                        Some(instance) => Some(unwrap_intercepted(instance)),
                        None => return Ok(false),
                    }
                }
                Some(declaring) => Some(lifecycle.receiver(declaring, &cc, contexts)?),
                None => None,
            };
            let manager = match &self.declaring {
                Some(declaring) => lifecycle.manager_for(declaring.archive()),
                None => lifecycle.root().clone(),
            };
            let args = lifecycle.resolve_arguments(&manager, &self.params, &cc, contexts)?;
            notify(receiver.as_ref(), payload, Arguments::for_member(args, self.member.clone()))?;
            Ok(true)
        })();
        if let Err(err) = cc.release() {
            tracing::warn!(target: "ferrous_beans::event", observer = %self.member, error = %err, "releasing observer dependents failed");
        }
        result
    }
}

impl fmt::Debug for ObserverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverMethod")
            .field("member", &self.member)
            .field("event_type", &self.event_type)
            .field("qualifiers", &self.qualifiers)
            .field("priority", &self.priority)
            .field("conditional", &self.conditional)
            .finish()
    }
}

fn unwrap_intercepted(instance: AnyArc) -> AnyArc {
    match instance.downcast_ref::<Intercepted>() {
        Some(intercepted) => intercepted.target_any().clone(),
        None => instance,
    }
}

impl LifecycleManager {
    /// Notifies every matching observer of `payload`, in priority order.
    /// Returns the number of observers notified.
    pub(crate) fn fire(
        self: &Arc<Self>,
        event_type: &BaseType,
        qualifiers: &[Qualifier],
        payload: &AnyArc,
        contexts: &ActiveContexts,
    ) -> BeanResult<usize> {
        let hierarchy = self.root().hierarchy().clone();
        let mut observers: Vec<_> = self
            .observer_methods()
            .into_iter()
            .filter(|o| o.observes(event_type, qualifiers, hierarchy.as_ref()))
            .collect();
        observers.sort_by_key(|o| o.priority);
        tracing::debug!(target: "ferrous_beans::event", event = %event_type, observers = observers.len(), "firing");

        let mut notified = 0;
        for observer in observers {
            if observer.deliver(self, payload, contexts)? {
                notified += 1;
            }
        }
        Ok(notified)
    }
}

/// Handle for firing events of one type and qualifier set.
#[derive(Clone)]
pub struct Event {
    lifecycle: Weak<LifecycleManager>,
    event_type: BaseType,
    qualifiers: Vec<Qualifier>,
    contexts: ActiveContexts,
}

impl Event {
    pub(crate) fn new(
        lifecycle: Weak<LifecycleManager>,
        event_type: BaseType,
        qualifiers: Vec<Qualifier>,
        contexts: ActiveContexts,
    ) -> Self {
        Self {
            lifecycle,
            event_type,
            qualifiers,
            contexts,
        }
    }

    pub fn event_type(&self) -> &BaseType {
        &self.event_type
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// A handle firing with `qualifiers` added.
    pub fn select(&self, qualifiers: &[Qualifier]) -> Event {
        let mut selected = self.clone();
        selected.qualifiers = merge_qualifiers(&self.qualifiers, qualifiers);
        selected
    }

    /// A handle firing a subtype of this handle's event type.
    pub fn select_type(&self, event_type: BaseType, qualifiers: &[Qualifier]) -> BeanResult<Event> {
        let lifecycle = self.lifecycle()?;
        let hierarchy = lifecycle.root().hierarchy().clone();
        if !hierarchy
            .closure(&event_type)
            .iter()
            .any(|t| self.event_type.is_assignable_from(t, hierarchy.as_ref()))
        {
            return Err(BeanError::IllegalState(format!(
                "{} is not a subtype of {}",
                event_type, self.event_type
            )));
        }
        let mut selected = self.select(qualifiers);
        selected.event_type = event_type;
        Ok(selected)
    }

    /// Fires `payload` and returns the number of observers notified.
    pub fn fire<T: Any + Send + Sync>(&self, payload: T) -> BeanResult<usize> {
        self.fire_any(Arc::new(payload))
    }

    pub fn fire_any(&self, payload: AnyArc) -> BeanResult<usize> {
        self.lifecycle()?
            .fire(&self.event_type, &self.qualifiers, &payload, &self.contexts)
    }

    fn lifecycle(&self) -> BeanResult<Arc<LifecycleManager>> {
        self.lifecycle
            .upgrade()
            .ok_or_else(|| BeanError::IllegalState("container has been shut down".to_string()))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

/// Adds `extra` to `current`. Explicit qualifiers replace an implicit
/// `@Default`.
pub(crate) fn merge_qualifiers(current: &[Qualifier], extra: &[Qualifier]) -> Vec<Qualifier> {
    let mut merged: Vec<Qualifier> = if extra.is_empty() {
        current.to_vec()
    } else {
        current.iter().filter(|q| !q.is_default()).cloned().collect()
    };
    for q in extra {
        if !merged.iter().any(|m| QualifierMatcher::is_match(m, q)) {
            merged.push(q.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassHierarchy;

    #[test]
    fn qualified_observers_need_a_matching_event_qualifier() {
        let hierarchy = ClassHierarchy::new();
        let ty = BaseType::from("Ping");
        let plain = ObserverMethod::new("A.on", ty.clone());
        let urgent = ObserverMethod::new("B.on", ty.clone()).qualifier(Qualifier::new("Urgent"));

        let default = [Qualifier::default_qualifier()];
        assert!(plain.observes(&ty, &default, &hierarchy));
        assert!(!urgent.observes(&ty, &default, &hierarchy));
        assert!(urgent.observes(&ty, &[Qualifier::new("Urgent")], &hierarchy));
        assert!(!plain.observes(&BaseType::from("Pong"), &default, &hierarchy));
    }

    #[test]
    fn selecting_replaces_default() {
        let merged = merge_qualifiers(&[Qualifier::default_qualifier()], &[Qualifier::new("Urgent")]);
        assert_eq!(merged, vec![Qualifier::new("Urgent")]);
        let same = merge_qualifiers(&merged, &[]);
        assert_eq!(same, merged);
    }
}
