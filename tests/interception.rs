//! Interceptor and decorator chains.

use std::sync::Arc;

use ferrous_beans::{
    AnyArc, BeanBuilder, BeanError, BeanLookup, ContainerBuilder, DecoratorMeta, InterceptionType,
    InterceptorMeta, Intercepted, ParamSpec, Qualifier,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct Target;
struct Tracer;

fn tracer(log: &Log, class: &'static str, binding: &str, interception: InterceptionType) -> BeanBuilder {
    let log = log.clone();
    BeanBuilder::new(class)
        .interceptor(InterceptorMeta::new().binding(Qualifier::new(binding)).on(
            interception,
            move |_: &Tracer, ctx| {
                log.lock().push(format!("{}:before", class));
                let out = ctx.proceed();
                log.lock().push(format!("{}:after", class));
                out
            },
        ))
        .constructor(vec![], |_| Ok(Tracer))
}

fn echo(log: &Log) -> BeanBuilder {
    let log = log.clone();
    BeanBuilder::new("Echo")
        .interceptor_binding(Qualifier::new("Traced"))
        .constructor(vec![], |_| Ok(Target))
        .method("echo", vec![ParamSpec::of::<String>()], move |_: &Target, args| {
            let text = args.get::<String>(0)?;
            log.lock().push("echo".to_string());
            Ok(Some(Arc::new((*text).clone()) as AnyArc))
        })
}

fn call(echo: &Intercepted, text: &str) -> Result<String, BeanError> {
    let out = echo.invoke("echo", vec![Some(Arc::new(text.to_string()) as AnyArc)])?;
    Ok(out
        .and_then(|v| v.downcast_ref::<String>().cloned())
        .unwrap_or_default())
}

#[test]
fn interceptors_run_in_priority_order() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(echo(&log))
        .bean(tracer(&log, "Inner", "Traced", InterceptionType::AroundInvoke).priority(20))
        .bean(tracer(&log, "Outer", "Traced", InterceptionType::AroundInvoke).priority(10))
        .build()
        .unwrap();

    let echo = container.get::<Intercepted>("Echo", &[]).unwrap();
    assert!(echo.is_intercepted("echo"));
    assert_eq!(call(&echo, "hi").unwrap(), "hi");
    assert_eq!(
        *log.lock(),
        vec!["Outer:before", "Inner:before", "echo", "Inner:after", "Outer:after"]
    );
}

#[test]
fn descriptor_order_comes_before_priority() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(echo(&log))
        .bean(tracer(&log, "Listed", "Traced", InterceptionType::AroundInvoke))
        .bean(tracer(&log, "Prioritized", "Traced", InterceptionType::AroundInvoke).priority(1))
        .enable_interceptor("Listed")
        .build()
        .unwrap();

    let echo = container.get::<Intercepted>("Echo", &[]).unwrap();
    call(&echo, "x").unwrap();
    assert_eq!(log.lock()[0], "Listed:before");
    assert_eq!(log.lock()[1], "Prioritized:before");
}

#[test]
fn disabled_interceptors_do_not_apply() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(echo(&log))
        // neither listed nor prioritized
        .bean(tracer(&log, "Dormant", "Traced", InterceptionType::AroundInvoke))
        .build()
        .unwrap();

    let echo = container.get::<Intercepted>("Echo", &[]).unwrap();
    assert!(!echo.is_intercepted("echo"));
    call(&echo, "x").unwrap();
    assert_eq!(*log.lock(), vec!["echo"]);
}

#[test]
fn interceptors_can_rewrite_parameters() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new()
        .bean(echo(&log))
        .bean(
            BeanBuilder::new("Upper")
                .priority(1)
                .interceptor(InterceptorMeta::new().binding(Qualifier::new("Traced")).on(
                    InterceptionType::AroundInvoke,
                    |_: &Tracer, ctx| {
                        let text = ctx.parameter::<String>(0)?.map(|s| s.to_uppercase()).unwrap_or_default();
                        ctx.set_parameter(0, Some(Arc::new(text) as AnyArc))?;
                        ctx.proceed()
                    },
                ))
                .constructor(vec![], |_| Ok(Tracer)),
        )
        .build()
        .unwrap();

    let echo = container.get::<Intercepted>("Echo", &[]).unwrap();
    assert_eq!(call(&echo, "quiet").unwrap(), "QUIET");

    // a parameter of the wrong type is rejected before reaching the method
    let err = echo.invoke("echo", vec![Some(Arc::new(5u8) as AnyArc)]).unwrap_err();
    assert!(matches!(err, BeanError::InvalidParameters { .. }), "{:?}", err);
}

#[derive(Debug)]
struct Banner(Arc<String>);

fn banner_container(replacement: fn() -> AnyArc, types: Option<Vec<ParamSpec>>) -> ferrous_beans::Container {
    let mut banner = BeanBuilder::new("Banner")
        .interceptor_binding(Qualifier::new("Shouting"))
        .constructor(vec![ferrous_beans::InjectionPoint::of("Motd")], |args| {
            Ok(Banner(args.get::<String>(0)?))
        });
    if let Some(types) = types {
        banner = banner.constructor_types(types);
    }
    ContainerBuilder::new()
        .bean(BeanBuilder::value("Motd", "welcome".to_string()))
        .bean(banner)
        .bean(
            BeanBuilder::new("Shout")
                .priority(1)
                .interceptor(InterceptorMeta::new().binding(Qualifier::new("Shouting")).on(
                    InterceptionType::AroundConstruct,
                    move |_: &Tracer, ctx| {
                        ctx.set_parameter(0, Some(replacement()))?;
                        ctx.proceed()
                    },
                ))
                .constructor(vec![], |_| Ok(Tracer)),
        )
        .build()
        .unwrap()
}

#[test]
fn around_construct_parameters_keep_their_types() {
    let shouted = banner_container(|| Arc::new("WELCOME".to_string()) as AnyArc, None);
    assert_eq!(*shouted.get::<Banner>("Banner", &[]).unwrap().0, "WELCOME");

    let wrong = banner_container(|| Arc::new(7u8) as AnyArc, None);
    let err = wrong.get::<Banner>("Banner", &[]).unwrap_err();
    assert!(format!("{:?}", err).contains("InvalidParameters"), "{:?}", err);

    // declared types are checked the same way
    let declared = banner_container(|| Arc::new(7u8) as AnyArc, Some(vec![ParamSpec::of::<String>()]));
    let err = declared.get::<Banner>("Banner", &[]).unwrap_err();
    assert!(format!("{:?}", err).contains("InvalidParameters"), "{:?}", err);

    let miscounted = BeanBuilder::new("Banner")
        .constructor(vec![ferrous_beans::InjectionPoint::of("Motd")], |_| Ok(Tracer))
        .constructor_types(vec![])
        .build();
    assert!(matches!(miscounted, Err(BeanError::Definition(_))));
}

#[test]
fn lifecycle_callbacks_are_intercepted() {
    let log: Log = Arc::default();
    let target_log = log.clone();
    let container = ContainerBuilder::new()
        .bean(
            BeanBuilder::new("Resource")
                .interceptor_binding(Qualifier::new("Tracked"))
                .constructor(vec![], |_| Ok(Target))
                .post_construct(move |_: &Target| {
                    target_log.lock().push("post_construct".to_string());
                    Ok(())
                }),
        )
        .bean(tracer(&log, "Construct", "Tracked", InterceptionType::AroundConstruct).priority(1))
        .bean(tracer(&log, "Init", "Tracked", InterceptionType::PostConstruct).priority(1))
        .bean(tracer(&log, "Teardown", "Tracked", InterceptionType::PreDestroy).priority(1))
        .build()
        .unwrap();

    // no business methods are intercepted, so the raw instance is handed out
    let resource = container.get::<Target>("Resource", &[]).unwrap();
    container.destroy(&(resource as AnyArc)).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "Construct:before",
            "Construct:after",
            "Init:before",
            "post_construct",
            "Init:after",
            "Teardown:before",
            "Teardown:after",
        ]
    );
}

#[test]
fn interceptor_failures_surface_as_their_root_cause() {
    let container = ContainerBuilder::new()
        .bean(echo(&Log::default()))
        .bean(
            BeanBuilder::new("Guard")
                .priority(1)
                .interceptor(InterceptorMeta::new().binding(Qualifier::new("Traced")).on(
                    InterceptionType::AroundInvoke,
                    |_: &Tracer, _ctx| Err(BeanError::message("access denied")),
                ))
                .constructor(vec![], |_| Ok(Tracer)),
        )
        .build()
        .unwrap();

    let echo = container.get::<Intercepted>("Echo", &[]).unwrap();
    let err = call(&echo, "x").unwrap_err();
    assert_eq!(err.root_cause().to_string(), "access denied");
}

trait Greeting: Send + Sync {
    fn text(&self) -> String;
}

struct Plain;
impl Greeting for Plain {
    fn text(&self) -> String {
        "hello".to_string()
    }
}

struct Wrap(&'static str, Arc<dyn Greeting>);
impl Greeting for Wrap {
    fn text(&self) -> String {
        format!("{}({})", self.0, self.1.text())
    }
}

fn wrapper(class: &'static str, priority: Option<i32>) -> BeanBuilder {
    let meta = DecoratorMeta::of("Greeting");
    let mut b = BeanBuilder::new(class)
        .types(&["Greeting"])
        .decorator(meta.clone())
        .constructor_raw(vec![meta.delegate_point()], move |args| {
            let inner = args.get_trait::<dyn Greeting>(0)?;
            Ok(Arc::new(Arc::new(Wrap(class, inner)) as Arc<dyn Greeting>))
        });
    if let Some(p) = priority {
        b = b.priority(p);
    }
    b
}

fn greeting() -> BeanBuilder {
    BeanBuilder::new("Plain")
        .types(&["Greeting"])
        .constructor(vec![], |_| Ok(Arc::new(Plain) as Arc<dyn Greeting>))
}

#[test]
fn last_decorator_is_outermost() {
    let container = ContainerBuilder::new()
        .bean(greeting())
        .bean(wrapper("Second", Some(20)))
        .bean(wrapper("First", Some(10)))
        .build()
        .unwrap();

    let greeting = container.get_trait::<dyn Greeting>("Greeting", &[]).unwrap();
    assert_eq!(greeting.text(), "Second(First(hello))");
}

#[test]
fn decorators_must_be_enabled() {
    let container = ContainerBuilder::new()
        .bean(greeting())
        .bean(wrapper("Off", None))
        .bean(wrapper("On", None))
        .enable_decorator("On")
        .build()
        .unwrap();

    let greeting = container.get_trait::<dyn Greeting>("Greeting", &[]).unwrap();
    assert_eq!(greeting.text(), "On(hello)");
}

#[test]
fn decorators_respect_delegate_qualifiers() {
    let meta = DecoratorMeta::of("Greeting").qualified(Qualifier::new("Loud"));
    let container = ContainerBuilder::new()
        .bean(greeting())
        .bean(
            BeanBuilder::new("Shouting")
                .types(&["Greeting"])
                .qualifier(Qualifier::new("Loud"))
                .constructor(vec![], |_| Ok(Arc::new(Plain) as Arc<dyn Greeting>)),
        )
        .bean(
            BeanBuilder::new("Exclaim")
                .types(&["Greeting"])
                .decorator(meta.clone())
                .priority(1)
                .constructor_raw(vec![meta.delegate_point()], |args| {
                    let inner = args.get_trait::<dyn Greeting>(0)?;
                    Ok(Arc::new(Arc::new(Wrap("Exclaim", inner)) as Arc<dyn Greeting>))
                }),
        )
        .build()
        .unwrap();

    let plain = container.get_trait::<dyn Greeting>("Greeting", &[]).unwrap();
    assert_eq!(plain.text(), "hello");
    let loud = container
        .get_trait::<dyn Greeting>("Greeting", &[Qualifier::new("Loud")])
        .unwrap();
    assert_eq!(loud.text(), "Exclaim(hello)");
}
