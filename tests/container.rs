//! Scopes, eager beans, passivation and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ferrous_beans::{BeanBuilder, BeanError, BeanHandle, BeanLookup, ContainerBuilder, ScopeKind};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct State(usize);

fn counted(class: &'static str, scope: ScopeKind, counter: &Arc<AtomicUsize>, log: &Log) -> BeanBuilder {
    let counter = counter.clone();
    let log = log.clone();
    BeanBuilder::new(class)
        .scope(scope)
        .constructor(vec![], move |_| Ok(State(counter.fetch_add(1, Ordering::SeqCst))))
        .pre_destroy(move |s: &State| {
            log.lock().push(format!("{}#{}", class, s.0));
            Ok(())
        })
}

#[test]
fn closing_a_scope_destroys_its_instances() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Cart", ScopeKind::Request, &counter, &log))
        .build()
        .unwrap();

    let request = container.enter_scope(ScopeKind::Request).unwrap();
    request.get::<State>("Cart", &[]).unwrap();
    assert_eq!(request.len(), 1);
    request.close().unwrap();
    assert_eq!(*log.lock(), vec!["Cart#0"]);

    assert!(!request.is_active());
    assert!(matches!(
        request.get::<State>("Cart", &[]),
        Err(BeanError::ContextNotActive(_))
    ));
}

#[test]
fn dropping_a_scope_handle_closes_it() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Cart", ScopeKind::Request, &counter, &log))
        .build()
        .unwrap();

    {
        let request = container.enter_scope(ScopeKind::Request).unwrap();
        request.get::<State>("Cart", &[]).unwrap();
    }
    assert_eq!(*log.lock(), vec!["Cart#0"]);

    let value = container
        .enter_scope(ScopeKind::Request)
        .unwrap()
        .using(|request| Ok(request.get::<State>("Cart", &[])?.0))
        .unwrap();
    assert_eq!(value, 1);
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn nested_scopes_see_their_outer_contexts() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Account", ScopeKind::Session, &counter, &log).passivation_capable())
        .bean(counted("Wizard", ScopeKind::Conversation, &counter, &log).passivation_capable())
        .build()
        .unwrap();

    let session = container.enter_scope(ScopeKind::Session).unwrap();
    let account = session.get::<State>("Account", &[]).unwrap();
    assert!(session.get::<State>("Wizard", &[]).is_err());

    let conversation = session.enter_scope(ScopeKind::Conversation).unwrap();
    assert!(Arc::ptr_eq(&account, &conversation.get::<State>("Account", &[]).unwrap()));
    conversation.get::<State>("Wizard", &[]).unwrap();

    conversation.close().unwrap();
    assert_eq!(*log.lock(), vec!["Wizard#1"]);
    assert!(Arc::ptr_eq(&account, &session.get::<State>("Account", &[]).unwrap()));
}

#[test]
fn container_wide_scopes_cannot_be_entered() {
    let container = ContainerBuilder::new().build().unwrap();
    for scope in [ScopeKind::Singleton, ScopeKind::Application, ScopeKind::Dependent] {
        assert!(
            matches!(container.enter_scope(scope.clone()), Err(BeanError::IllegalState(_))),
            "{}",
            scope
        );
    }
}

#[test]
fn shutdown_hooks_run_last_in_reverse_order() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Cache", ScopeKind::Application, &counter, &log))
        .build()
        .unwrap();
    container.get::<State>("Cache", &[]).unwrap();

    for label in ["first", "second"] {
        let log = log.clone();
        container.on_shutdown(label, move || {
            log.lock().push(label.to_string());
            Ok(())
        });
    }
    container.shutdown().unwrap();
    assert_eq!(*log.lock(), vec!["Cache#0", "second", "first"]);
    assert!(container.is_shut_down());
}

#[test]
fn failing_hooks_do_not_stop_shutdown() {
    let log: Log = Arc::default();
    let sink = log.clone();
    let container = ContainerBuilder::new().build().unwrap();
    container.on_shutdown("flush", move || {
        sink.lock().push("flush".to_string());
        Ok(())
    });
    container.on_shutdown("broken", || Err(BeanError::message("socket closed")));

    let err = container.shutdown().unwrap_err();
    assert!(err.to_string().contains("socket closed"), "{}", err);
    assert_eq!(*log.lock(), vec!["flush"]);
}

#[test]
fn eager_beans_start_with_the_container() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Scheduler", ScopeKind::Application, &counter, &log).eager())
        .bean(counted("Lazy", ScopeKind::Application, &counter, &log))
        .build()
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let report = container.startup_report();
    assert!(report.all_started());
    assert_eq!(report.started_count(), 1);
    assert!(report.results[0].bean.contains("Scheduler"));

    // the eager instance is the contextual one
    assert_eq!(container.get::<State>("Scheduler", &[]).unwrap().0, 0);
}

#[test]
fn failed_eager_beans_are_retained_as_the_startup_failure() {
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("Pool")
                .scope(ScopeKind::Singleton)
                .eager()
                .constructor(vec![], |_| -> ferrous_beans::BeanResult<State> {
                    Err(BeanError::message("no connections"))
                }),
        )
        .bean(BeanBuilder::value("Healthy", 1u8))
        .start()
        .unwrap();

    let report = container.startup_report();
    assert!(!report.all_started());
    assert_eq!(report.failures().count(), 1);

    for _ in 0..2 {
        match container.check() {
            Err(BeanError::Creation { bean, source }) => {
                assert!(bean.contains("Pool"), "{}", bean);
                assert_eq!(source.to_string(), "no connections");
            }
            other => panic!("expected the retained failure, got {:?}", other),
        }
        assert!(matches!(
            container.get::<u8>("Healthy", &[]),
            Err(BeanError::Creation { .. })
        ));
    }
}

#[test]
fn passivated_handles_reattach_to_the_current_session() {
    let log: Log = Arc::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let container = ContainerBuilder::new()
        .bean(counted("Preferences", ScopeKind::Session, &counter, &log).passivation_capable())
        .build()
        .unwrap();

    let bean = container.resolve("Preferences", &[]).unwrap();
    let json = serde_json::to_string(&BeanHandle::for_bean(&bean).unwrap()).unwrap();
    let handle: BeanHandle = serde_json::from_str(&json).unwrap();
    assert_eq!(handle.archive(), "root");

    let first = container.enter_scope(ScopeKind::Session).unwrap();
    let original = first.get::<State>("Preferences", &[]).unwrap();
    assert!(Arc::ptr_eq(&original, &handle.reattach_as::<State>(&first).unwrap()));

    let second = container.enter_scope(ScopeKind::Session).unwrap();
    let restored = handle.reattach_as::<State>(&second).unwrap();
    assert!(!Arc::ptr_eq(&original, &restored));
    assert_eq!(restored.0, 1);
}

#[test]
fn non_passivating_sessions_are_definition_errors() {
    let err = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("Basket")
                .scope(ScopeKind::Session)
                .constructor(vec![], |_| Ok(State(0))),
        )
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("passivation"), "{}", err);
}

#[cfg(feature = "diagnostics")]
#[test]
fn debug_string_lists_archives_and_beans() {
    let container = ContainerBuilder::new()
        .bean(BeanBuilder::new("Cache").scope(ScopeKind::Singleton).constructor(vec![], |_| Ok(State(0))))
        .bean(
            BeanBuilder::new("MockCache")
                .types(&["Cache"])
                .alternative()
                .constructor(vec![], |_| Ok(State(1))),
        )
        .enable_alternative("MockCache")
        .build()
        .unwrap();

    let text = container.to_debug_string();
    assert!(text.contains("archive root"), "{}", text);
    assert!(text.contains("alternatives: [MockCache]"), "{}", text);
}

#[test]
fn logging_observer_reports_lookups() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let container = ContainerBuilder::new()
        .bean(BeanBuilder::value("Port", 8080u16))
        .observer(Arc::new(ferrous_beans::LoggingObserver::with_prefix("container-test")))
        .build()
        .unwrap();
    assert_eq!(*container.get::<u16>("Port", &[]).unwrap(), 8080);
    assert!(matches!(container.get::<u16>("Host", &[]), Err(BeanError::Unsatisfied { .. })));
}
