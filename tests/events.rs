//! Observer methods and the `Event` built-in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ferrous_beans::{
    AnnotatedType, Annotation, ArchiveSource, BaseType, BeanBuilder, BeanLookup, ClassHierarchy, ContainerBuilder,
    Event, InjectionPoint, ObserverMethod, Qualifier, ScopeKind, StaticIntrospector,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct OrderPlaced {
    id: u32,
}

fn recorder(log: &Log, member: &'static str, priority: i32) -> ObserverMethod {
    let log = log.clone();
    ObserverMethod::new(member, BaseType::from("OrderPlaced"))
        .priority(priority)
        .notify_static(move |e: &OrderPlaced, _| {
            log.lock().push(format!("{}:{}", member, e.id));
            Ok(())
        })
}

#[test]
fn observers_are_notified_in_priority_order() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .observer_method(recorder(&log, "late", 3000))
        .observer_method(recorder(&log, "early", 10))
        .observer_method(recorder(&log, "default", ferrous_beans::event::DEFAULT_OBSERVER_PRIORITY))
        .build()
        .unwrap();

    let notified = container.fire("OrderPlaced", &[], OrderPlaced { id: 7 }).unwrap();
    assert_eq!(notified, 3);
    assert_eq!(*log.lock(), vec!["early:7", "default:7", "late:7"]);
}

#[test]
fn qualified_observers_only_see_matching_events() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .observer_method(recorder(&log, "all", 1))
        .observer_method(recorder(&log, "express", 2).qualifier(Qualifier::new("Express")))
        .build()
        .unwrap();

    container.fire("OrderPlaced", &[], OrderPlaced { id: 1 }).unwrap();
    container
        .fire("OrderPlaced", &[Qualifier::new("Express")], OrderPlaced { id: 2 })
        .unwrap();
    assert_eq!(*log.lock(), vec!["all:1", "all:2", "express:2"]);
}

#[test]
fn observers_of_a_supertype_see_subtype_events() {
    let log: Log = Arc::default();
    let sink = log.clone();
    let hierarchy = ClassHierarchy::new()
        .with("OrderPlaced", &[], &["OrderEvent"])
        .unwrap();
    let container = ContainerBuilder::new()
        .hierarchy(hierarchy)
        .observer_method(
            ObserverMethod::new("audit", BaseType::from("OrderEvent")).notify_raw(move |_, payload, _| {
                let id = payload.downcast_ref::<OrderPlaced>().map_or(0, |e| e.id);
                sink.lock().push(format!("audit:{}", id));
                Ok(())
            }),
        )
        .build()
        .unwrap();

    assert_eq!(container.fire("OrderPlaced", &[], OrderPlaced { id: 4 }).unwrap(), 1);
    assert_eq!(container.fire("OrderCancelled", &[], OrderPlaced { id: 5 }).unwrap(), 0);
    assert_eq!(*log.lock(), vec!["audit:4"]);
}

#[test]
fn injected_event_handles_fire_with_their_qualifiers() {
    struct Checkout {
        placed: Arc<Event>,
    }

    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .observer_method(recorder(&log, "express", 1).qualifier(Qualifier::new("Express")))
        .bean(
            BeanBuilder::new("Checkout").constructor(
                vec![InjectionPoint::of("Event<OrderPlaced>").qualified(Qualifier::new("Express"))],
                |args| {
                    Ok(Checkout {
                        placed: args.get::<Event>(0)?,
                    })
                },
            ),
        )
        .build()
        .unwrap();

    let checkout = container.get::<Checkout>("Checkout", &[]).unwrap();
    assert_eq!(checkout.placed.event_type().to_string(), "OrderPlaced");
    assert_eq!(checkout.placed.fire(OrderPlaced { id: 9 }).unwrap(), 1);
    assert_eq!(*log.lock(), vec!["express:9"]);
}

struct Inventory {
    reserved: AtomicUsize,
}

fn inventory_type(scope: ScopeKind, conditional: bool) -> AnnotatedType {
    let mut observer = ObserverMethod::new("Inventory.on_order", BaseType::from("OrderPlaced")).notify(
        |inventory: &Inventory, _: &OrderPlaced, _| {
            inventory.reserved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    if conditional {
        observer = observer.if_exists();
    }
    AnnotatedType::new("Inventory")
        .annotate(Annotation::Scope(scope))
        .program(BeanBuilder::new("Inventory").constructor(vec![], |_| {
            Ok(Inventory {
                reserved: AtomicUsize::new(0),
            })
        }))
        .observer(observer)
}

fn inventory_container(scope: ScopeKind, conditional: bool) -> ferrous_beans::Container {
    ContainerBuilder::new()
        .introspector(StaticIntrospector::new().with(inventory_type(scope, conditional)))
        .archive(ArchiveSource::root().classes(&["Inventory"]))
        .build()
        .unwrap()
}

#[test]
fn observer_receivers_are_contextual_instances() {
    let container = inventory_container(ScopeKind::Application, false);
    container.fire("OrderPlaced", &[], OrderPlaced { id: 1 }).unwrap();
    container.fire("OrderPlaced", &[], OrderPlaced { id: 2 }).unwrap();
    let inventory = container.get::<Inventory>("Inventory", &[]).unwrap();
    assert_eq!(inventory.reserved.load(Ordering::SeqCst), 2);
}

#[test]
fn conditional_observers_skip_missing_receivers() {
    let container = inventory_container(ScopeKind::Application, true);
    assert_eq!(container.fire("OrderPlaced", &[], OrderPlaced { id: 1 }).unwrap(), 0);

    let inventory = container.get::<Inventory>("Inventory", &[]).unwrap();
    assert_eq!(container.fire("OrderPlaced", &[], OrderPlaced { id: 2 }).unwrap(), 1);
    assert_eq!(inventory.reserved.load(Ordering::SeqCst), 1);
}

#[test]
fn request_scoped_receivers_need_an_active_request() {
    let container = inventory_container(ScopeKind::Request, false);
    assert!(container.fire("OrderPlaced", &[], OrderPlaced { id: 1 }).is_err());

    let request = container.enter_scope(ScopeKind::Request).unwrap();
    assert_eq!(request.fire("OrderPlaced", &[], OrderPlaced { id: 2 }).unwrap(), 1);
    let inventory = request.get::<Inventory>("Inventory", &[]).unwrap();
    assert_eq!(inventory.reserved.load(Ordering::SeqCst), 1);
}
