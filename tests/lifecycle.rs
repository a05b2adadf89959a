//! Creation, injection and destruction of bean instances.

use std::sync::Arc;

use ferrous_beans::{
    AnyArc, BeanBuilder, BeanError, BeanLookup, ContainerBuilder, InjectionPoint, ProducerBuilder, Qualifier,
    ScopeKind,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct Node;

fn logged(log: &Log, class: &'static str, params: Vec<InjectionPoint>) -> BeanBuilder {
    let log = log.clone();
    BeanBuilder::new(class)
        .constructor(params, |_| Ok(Node))
        .pre_destroy(move |_: &Node| {
            log.lock().push(class.to_string());
            Ok(())
        })
}

#[test]
fn destroying_an_owner_tears_down_dependents_in_reverse() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(logged(&log, "D1", vec![]))
        .bean(logged(&log, "D2", vec![]))
        .bean(logged(&log, "Owner", vec![InjectionPoint::of("D1"), InjectionPoint::of("D2")]))
        .build()
        .unwrap();

    let owner = container.get::<Node>("Owner", &[]).unwrap();
    container.destroy(&(owner as AnyArc)).unwrap();
    assert_eq!(*log.lock(), vec!["D2", "D1", "Owner"]);
}

#[test]
fn destroyed_dependents_are_not_kept_alive_by_the_container() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(logged(&log, "Temp", vec![]))
        .build()
        .unwrap();

    for round in 0..1_000 {
        let temp = container.get::<Node>("Temp", &[]).unwrap();
        let erased: AnyArc = temp.clone();
        container.destroy(&erased).unwrap();
        drop(erased);
        assert_eq!(Arc::strong_count(&temp), 1, "round {}", round);
    }
    assert_eq!(log.lock().len(), 1_000);

    // already destroyed
    let temp: AnyArc = container.get::<Node>("Temp", &[]).unwrap();
    container.destroy(&temp).unwrap();
    assert!(container.destroy(&temp).is_err());
}

#[test]
fn shutdown_destroys_container_owned_dependents() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(logged(&log, "Leaf", vec![]))
        .bean(logged(&log, "Branch", vec![InjectionPoint::of("Leaf")]))
        .build()
        .unwrap();

    container.get::<Node>("Branch", &[]).unwrap();
    assert!(log.lock().is_empty());
    container.shutdown().unwrap();
    assert_eq!(*log.lock(), vec!["Leaf", "Branch"]);

    // shutting down twice is harmless, lookups are refused
    container.shutdown().unwrap();
    assert!(matches!(
        container.get::<Node>("Branch", &[]),
        Err(BeanError::IllegalState(_))
    ));
}

#[test]
fn singletons_are_shared_and_dependents_are_not() {
    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Config").scope(ScopeKind::Singleton).constructor(vec![], |_| Ok(Node)))
        .bean(BeanBuilder::new("Task").constructor(vec![], |_| Ok(Node)))
        .build()
        .unwrap();

    let a = container.get::<Node>("Config", &[]).unwrap();
    let b = container.get::<Node>("Config", &[]).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let x = container.get::<Node>("Task", &[]).unwrap();
    let y = container.get::<Node>("Task", &[]).unwrap();
    assert!(!Arc::ptr_eq(&x, &y));
}

#[test]
fn post_construct_sees_injected_fields() {
    struct Shop {
        stock: Mutex<Option<Arc<u32>>>,
        ready: Mutex<bool>,
    }

    let container = ContainerBuilder::new()
        .bean(BeanBuilder::value("Stock", 12u32))
        .bean(
            BeanBuilder::new("Shop")
                .constructor(vec![], |_| {
                    Ok(Shop {
                        stock: Mutex::new(None),
                        ready: Mutex::new(false),
                    })
                })
                .inject(InjectionPoint::of("Stock").at("Shop.stock"), |shop: &Shop, args| {
                    *shop.stock.lock() = Some(args.get::<u32>(0)?);
                    Ok(())
                })
                .post_construct(|shop: &Shop| {
                    let stocked = shop.stock.lock().is_some();
                    *shop.ready.lock() = stocked;
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    let shop = container.get::<Shop>("Shop", &[]).unwrap();
    assert!(*shop.ready.lock());
    assert_eq!(**shop.stock.lock().as_ref().unwrap(), 12);
}

#[test]
fn dependents_receive_their_injection_point() {
    struct Logger {
        category: String,
    }
    struct Shop {
        logger: Arc<Logger>,
    }

    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("Logger").constructor(vec![InjectionPoint::of("InjectionPoint")], |args| {
                let ip = args.get::<InjectionPoint>(0)?;
                Ok(Logger {
                    category: ip.member.clone(),
                })
            }),
        )
        .bean(
            BeanBuilder::new("Shop").constructor(vec![InjectionPoint::of("Logger").at("Shop.logger")], |args| {
                Ok(Shop {
                    logger: args.get::<Logger>(0)?,
                })
            }),
        )
        .build()
        .unwrap();

    let shop = container.get::<Shop>("Shop", &[]).unwrap();
    assert_eq!(shop.logger.category, "Shop.logger");
}

#[test]
fn disposers_run_with_the_product() {
    struct Connection {
        url: String,
    }
    let closed: Log = Arc::default();
    let sink = closed.clone();

    let producer = ProducerBuilder::method(None, "Pool.connect")
        .produce_static(|_| {
            Ok(Some(Connection {
                url: "db://main".to_string(),
            }))
        })
        .disposes("Pool.close", vec![], move |c: &Connection, _| {
            sink.lock().push(c.url.clone());
            Ok(())
        })
        .build()
        .unwrap();

    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Pool.connect").types(&["Connection"]).producer(producer))
        .build()
        .unwrap();

    let conn = container.get::<Connection>("Connection", &[]).unwrap();
    assert_eq!(conn.url, "db://main");
    container.shutdown().unwrap();
    assert_eq!(*closed.lock(), vec!["db://main"]);
}

#[test]
fn failing_constructors_are_wrapped_once() {
    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Broken").constructor(vec![], |_| -> ferrous_beans::BeanResult<Node> {
            Err(BeanError::message("disk full"))
        }))
        .build()
        .unwrap();

    match container.get::<Node>("Broken", &[]) {
        Err(BeanError::Creation { bean, source }) => {
            assert!(bean.contains("Broken"), "{}", bean);
            assert_eq!(source.to_string(), "disk full");
        }
        other => panic!("expected a creation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn instance_handles_iterate_and_select() {
    struct Plugin(&'static str);

    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("Audit")
                .types(&["Plugin"])
                .qualifier(Qualifier::new("Audit"))
                .constructor(vec![], |_| Ok(Plugin("audit"))),
        )
        .bean(
            BeanBuilder::new("Cache")
                .types(&["Plugin"])
                .qualifier(Qualifier::new("Cache"))
                .constructor(vec![], |_| Ok(Plugin("cache"))),
        )
        .build()
        .unwrap();

    let all = container.instance("Plugin", &[Qualifier::any()]).unwrap();
    assert!(all.is_ambiguous());
    let mut names: Vec<&str> = all
        .iter()
        .map(|r| r.unwrap().unwrap().downcast_ref::<Plugin>().unwrap().0)
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["audit", "cache"]);

    let cache = all.select(&[Qualifier::new("Cache")]);
    assert!(cache.is_resolvable());
    assert_eq!(cache.get::<Plugin>().unwrap().0, "cache");

    let missing = container.instance("Plugin", &[Qualifier::new("Metrics")]).unwrap();
    assert!(missing.is_unsatisfied());
}

#[test]
fn instance_destroy_releases_a_dependent() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(logged(&log, "Job", vec![]))
        .build()
        .unwrap();

    let jobs = container.instance("Job", &[]).unwrap();
    let job = jobs.get_reference().unwrap().unwrap();
    jobs.destroy(&job).unwrap();
    assert_eq!(*log.lock(), vec!["Job"]);
    assert!(jobs.destroy(&job).is_err());
}
