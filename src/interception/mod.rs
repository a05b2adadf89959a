//! Interceptors: metadata, chain selection and intercepted instances.
//!
//! An interceptor is an ordinary bean carrying [`InterceptorMeta`]. It is
//! bound to a target bean when every one of its interceptor bindings is
//! among the target's effective bindings (class-level bindings, plus the
//! method's own bindings for `AROUND_INVOKE`). Chains are ordered with the
//! interceptors listed in the archive's deployment first, in list order,
//! followed by interceptors enabled through a priority, lowest first.

mod invocation;

pub use invocation::{ChainLink, InvocationContext, ParamSpec, Terminal};
pub(crate) use invocation::run_chain;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bean::{self, AnyArc, Arguments, BeanDefinition, BeanId, BeanKind, BusinessMethod, Reference};
use crate::error::{BeanError, BeanResult};
use crate::qualifier::{InterceptorBinding, QualifierMatcher};
use crate::resolver::BeanManager;

/// Kinds of interception a callback can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterceptionType {
    AroundConstruct,
    AroundInvoke,
    PostConstruct,
    PreDestroy,
    PrePassivate,
    PostActivate,
}

/// A callback on an interceptor instance.
pub type InterceptorMethod =
    Arc<dyn Fn(&AnyArc, &mut InvocationContext<'_>) -> BeanResult<Reference> + Send + Sync>;

/// Interceptor metadata attached to a bean definition.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, InterceptionType, InterceptorMeta, Qualifier};
///
/// struct Audit;
///
/// let meta = InterceptorMeta::new()
///     .binding(Qualifier::new("Audited"))
///     .on(InterceptionType::AroundInvoke, |_audit: &Audit, ctx| ctx.proceed());
///
/// let bean = BeanBuilder::new("AuditInterceptor")
///     .interceptor(meta)
///     .priority(10)
///     .constructor(vec![], |_| Ok(Audit))
///     .build()
///     .unwrap();
/// assert!(bean.interceptor().unwrap().handles(InterceptionType::AroundInvoke));
/// ```
#[derive(Clone, Default)]
pub struct InterceptorMeta {
    bindings: Vec<InterceptorBinding>,
    callbacks: AHashMap<InterceptionType, InterceptorMethod>,
}

impl InterceptorMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(mut self, binding: InterceptorBinding) -> Self {
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
        self
    }

    /// Registers a callback on an interceptor of concrete type `T`.
    pub fn on<T, F>(self, interception: InterceptionType, callback: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut InvocationContext<'_>) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        self.on_raw(interception, move |instance, ctx| {
            callback(bean::target::<T>(instance, std::any::type_name::<T>())?, ctx)
        })
    }

    pub fn on_raw<F>(mut self, interception: InterceptionType, callback: F) -> Self
    where
        F: Fn(&AnyArc, &mut InvocationContext<'_>) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        self.callbacks.insert(interception, Arc::new(callback));
        self
    }

    pub fn bindings(&self) -> &[InterceptorBinding] {
        &self.bindings
    }

    pub fn handles(&self, interception: InterceptionType) -> bool {
        self.callbacks.contains_key(&interception)
    }

    pub fn callback(&self, interception: InterceptionType) -> Option<&InterceptorMethod> {
        self.callbacks.get(&interception)
    }

    /// True if every binding of this interceptor is among `effective`.
    pub fn is_bound_by(&self, effective: &[InterceptorBinding]) -> bool {
        !self.bindings.is_empty()
            && self
                .bindings
                .iter()
                .all(|b| effective.iter().any(|e| QualifierMatcher::is_match(b, e)))
    }
}

impl fmt::Debug for InterceptorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handled: Vec<_> = self.callbacks.keys().collect();
        handled.sort();
        f.debug_struct("InterceptorMeta")
            .field("bindings", &self.bindings)
            .field("callbacks", &handled)
            .finish()
    }
}

/// Enabled interceptors or decorators in invocation order.
pub type ChainBeans = Arc<[Arc<BeanDefinition>]>;

/// Filters `candidates` down to the enabled ones and orders them: classes
/// listed in `listed` first, in list order, then prioritized ones by
/// ascending priority with the class name breaking ties.
pub(crate) fn enabled_in_order(
    listed: &[Arc<str>],
    mut candidates: Vec<Arc<BeanDefinition>>,
) -> Vec<Arc<BeanDefinition>> {
    let position = |bean: &BeanDefinition| listed.iter().position(|c| **c == *bean.bean_class());
    candidates.retain(|b| position(b).is_some() || b.priority().is_some());
    candidates.sort_by(|a, b| {
        let key = |bean: &BeanDefinition| match position(bean) {
            Some(idx) => (0, idx as i64, String::new()),
            None => (1, i64::from(bean.priority().unwrap_or(0)), bean.bean_class().to_string()),
        };
        key(a).cmp(&key(b))
    });
    candidates.dedup_by(|a, b| a.id() == b.id());
    candidates
}

type ChainKey = (BeanId, InterceptionType, Option<Arc<str>>);

/// Selects and orders the interceptors bound to a bean.
///
/// Once the deployment of the bean's archive is frozen the chains can no
/// longer change and are cached per bean, interception type and method.
#[derive(Default)]
pub struct InterceptorChainBuilder {
    cache: RwLock<AHashMap<ChainKey, ChainBeans>>,
}

impl InterceptorChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Class-level bindings, plus the method's own for `AROUND_INVOKE`.
    pub fn effective_bindings(
        bean: &BeanDefinition,
        method: Option<&BusinessMethod>,
    ) -> Vec<InterceptorBinding> {
        let mut bindings = bean.interceptor_bindings().to_vec();
        if let Some(m) = method {
            for b in &m.bindings {
                if !bindings.contains(b) {
                    bindings.push(b.clone());
                }
            }
        }
        bindings
    }

    /// The interceptors for `interception` on `bean`, resolved against the
    /// archive `manager` that declared the bean.
    pub fn build(
        &self,
        manager: &BeanManager,
        bean: &BeanDefinition,
        interception: InterceptionType,
        method: Option<&BusinessMethod>,
    ) -> ChainBeans {
        // interceptors and decorators are never intercepted themselves
        if bean.interceptor().is_some() || bean.decorator().is_some() {
            return Arc::from(Vec::new());
        }

        let key: ChainKey = (bean.id(), interception, method.map(|m| m.name.clone()));
        if let Some(chain) = self.cache.read().get(&key) {
            return chain.clone();
        }

        let effective = Self::effective_bindings(bean, method);
        let candidates: Vec<Arc<BeanDefinition>> = if effective.is_empty() {
            Vec::new()
        } else {
            manager
                .visible_beans()
                .into_iter()
                .filter(|b| {
                    b.interceptor()
                        .map_or(false, |m| m.handles(interception) && m.is_bound_by(&effective))
                })
                .collect()
        };

        let (listed, frozen) = {
            let deployment = manager.deployment();
            (deployment.interceptors().to_vec(), deployment.is_frozen())
        };
        let chain: ChainBeans = enabled_in_order(&listed, candidates).into();

        if !chain.is_empty() {
            tracing::trace!(
                target: "ferrous_beans::interceptor",
                bean = %bean.bean_class(),
                ?interception,
                method = ?method.map(|m| &*m.name),
                interceptors = chain.len(),
                "interceptor chain built"
            );
        }
        if frozen {
            self.cache.write().insert(key, chain.clone());
        }
        chain
    }

    /// Number of cached chains.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl fmt::Debug for InterceptorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChainBuilder")
            .field("cached", &self.cached())
            .finish()
    }
}

/// Resolved chain for one business method.
#[derive(Clone)]
pub(crate) struct MethodChain {
    pub(crate) method: BusinessMethod,
    pub(crate) links: Arc<[ChainLink]>,
}

/// A bean instance whose business methods run through interceptor chains
///
/// This is the default enhancement for beans with `AROUND_INVOKE`
/// interceptors: clients obtain an `Intercepted` instead of the raw instance
/// and call methods by name.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{
///     AnyArc, BeanBuilder, BeanLookup, ContainerBuilder, InterceptionType, InterceptorMeta,
///     Intercepted, ParamSpec, Qualifier,
/// };
///
/// struct Greeter;
/// struct Shout;
///
/// let container = ContainerBuilder::new()
///     .bean(
///         BeanBuilder::new("Greeter")
///             .interceptor_binding(Qualifier::new("Loud"))
///             .constructor(vec![], |_| Ok(Greeter))
///             .method("greet", vec![ParamSpec::of::<String>()], |_: &Greeter, args| {
///                 let name = args.get::<String>(0)?;
///                 Ok(Some(Arc::new(format!("hello {}", name)) as AnyArc))
///             }),
///     )
///     .bean(
///         BeanBuilder::new("ShoutInterceptor")
///             .priority(1)
///             .interceptor(InterceptorMeta::new().binding(Qualifier::new("Loud")).on(
///                 InterceptionType::AroundInvoke,
///                 |_: &Shout, ctx| {
///                     let out = ctx.proceed()?.expect("greeting");
///                     let text = out.downcast_ref::<String>().expect("string").to_uppercase();
///                     Ok(Some(Arc::new(text) as AnyArc))
///                 },
///             ))
///             .constructor(vec![], |_| Ok(Shout)),
///     )
///     .build()
///     .unwrap();
///
/// let greeter = container.get::<Intercepted>("Greeter", &[]).unwrap();
/// let out = greeter.invoke("greet", vec![Some(Arc::new("bob".to_string()) as AnyArc)]).unwrap();
/// assert_eq!(out.unwrap().downcast_ref::<String>().unwrap(), "HELLO BOB");
/// ```
pub struct Intercepted {
    bean: Arc<BeanDefinition>,
    target: AnyArc,
    methods: AHashMap<Arc<str>, MethodChain>,
}

impl Intercepted {
    pub(crate) fn new(
        bean: Arc<BeanDefinition>,
        target: AnyArc,
        methods: AHashMap<Arc<str>, MethodChain>,
    ) -> Self {
        Self {
            bean,
            target,
            methods,
        }
    }

    pub fn bean(&self) -> &Arc<BeanDefinition> {
        &self.bean
    }

    /// The raw, unintercepted instance.
    pub fn target_any(&self) -> &AnyArc {
        &self.target
    }

    pub fn target<T: Any + Send + Sync>(&self) -> BeanResult<&T> {
        bean::target::<T>(&self.target, self.bean.bean_class())
    }

    /// True if calls to `method` pass through at least one interceptor.
    pub fn is_intercepted(&self, method: &str) -> bool {
        self.methods
            .get(method)
            .map_or(false, |m| !m.links.is_empty())
    }

    /// Invokes business method `method`, running its `AROUND_INVOKE` chain.
    pub fn invoke(&self, method: &str, args: Vec<Reference>) -> BeanResult<Reference> {
        let chain = self.methods.get(method).ok_or_else(|| {
            BeanError::IllegalState(format!(
                "{} has no business method {}",
                self.bean.bean_class(),
                method
            ))
        })?;
        let owner = format!("{}.{}", self.bean.bean_class(), method);
        let invoke = chain.method.invoke.clone();

        if chain.links.is_empty() {
            return invoke(&self.target, Arguments::for_member(args, owner));
        }

        let mut terminal = |target: Option<&AnyArc>, params: Vec<Reference>| -> BeanResult<Reference> {
            let target = target.ok_or_else(|| BeanError::IllegalState(format!("{} has no target", owner)))?;
            invoke(target, Arguments::for_member(params, owner.clone()))
        };
        let (result, _) = run_chain(
            InterceptionType::AroundInvoke,
            Some(self.target.clone()),
            Some(method),
            args,
            &chain.method.params,
            &chain.links,
            &mut terminal,
        )?;
        Ok(result)
    }
}

impl fmt::Debug for Intercepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(|m| &**m).collect();
        methods.sort_unstable();
        f.debug_struct("Intercepted")
            .field("bean", &self.bean.bean_class())
            .field("methods", &methods)
            .finish()
    }
}

/// Turns an intercepted instance into the reference handed to clients.
///
/// Hosts that generate subclass-style wrappers plug in their own provider;
/// the default hands out the [`Intercepted`] handle itself.
pub trait EnhancementProvider: Send + Sync {
    fn enhance(&self, intercepted: Intercepted) -> BeanResult<AnyArc>;
}

/// Hands out [`Intercepted`] handles unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEnhancement;

impl EnhancementProvider for DefaultEnhancement {
    fn enhance(&self, intercepted: Intercepted) -> BeanResult<AnyArc> {
        Ok(Arc::new(intercepted))
    }
}

/// The business methods of a managed bean.
pub(crate) fn business_methods(bean: &BeanDefinition) -> &[BusinessMethod] {
    match bean.kind() {
        BeanKind::Managed(m) => &m.methods,
        _ => &[],
    }
}
