//! Instance creation, injection and destruction.
//!
//! Every bean gets a [`ReferenceFactory`] on first use, chosen from its
//! production strategy and scope. Dependent beans are created below the
//! requesting creational context and destroyed with it. Beans of any other
//! scope are created once per active scope context in their own creation
//! tree, which the context releases when it ends.
//!
//! Creation of a managed bean runs these steps, each failure aborting the
//! rest:
//!
//! 1. resolve constructor arguments
//! 2. allocate through the `AROUND_CONSTRUCT` chain
//! 3. push the instance onto its creational context
//! 4. run field and initializer injection, then enter `Injected`
//! 5. run the `POST_CONSTRUCT` chain, then enter `PostConstructed`
//! 6. install the destroy hook (`PRE_DESTROY` chain)
//! 7. wrap business methods with `AROUND_INVOKE` chains, apply decorators
//!    and enter `Active`

mod reference;

pub use reference::{LazyReference, LazyReferenceProvider, ProxyProvider};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bean::{
    AnyArc, Arguments, ArchiveId, BeanDefinition, BeanId, BeanKind, BuiltIn, Callback,
    InjectionPoint, ManagedBean, Producer, Reference, SyntheticFn,
};
use crate::context::{ActiveContexts, Created, CreationalContext, InFlight, LifecycleState};
use crate::decoration::DecoratorChainBuilder;
use crate::error::{BeanError, BeanResult};
use crate::event::{Event, ObserverMethod};
use crate::instance::Instance;
use crate::interception::{
    run_chain, ChainLink, EnhancementProvider, InterceptionType, Intercepted,
    InterceptorChainBuilder, MethodChain, ParamSpec,
};
use crate::internal::CreationGuard;
use crate::key::ResolutionKey;
use crate::observer::Observers;
use crate::qualifier::Qualifier;
use crate::resolver::BeanManager;
use crate::traits::BeanLookupCore;
use crate::types::BaseType;

/// How references to one bean are obtained.
#[derive(Clone)]
enum ReferenceFactory {
    /// New instance below the requesting context.
    Dependent,
    /// Instance owned by the active context of the bean's scope.
    Contextual,
    /// Lazy client proxy onto the contextual instance.
    Proxied,
    Value(AnyArc),
    InjectionPoint,
    Instance,
    Event,
    Delegate,
    /// A problem detected when the factory was built, reported on every use.
    Failed(BeanError),
}

impl fmt::Debug for ReferenceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceFactory::Dependent => "Dependent",
            ReferenceFactory::Contextual => "Contextual",
            ReferenceFactory::Proxied => "Proxied",
            ReferenceFactory::Value(_) => "Value",
            ReferenceFactory::InjectionPoint => "InjectionPoint",
            ReferenceFactory::Instance => "Instance",
            ReferenceFactory::Event => "Event",
            ReferenceFactory::Delegate => "Delegate",
            ReferenceFactory::Failed(_) => "Failed",
        };
        f.write_str(name)
    }
}

/// Interceptor instances created for one target, shared across its chains.
type InterceptorInstances = AHashMap<BeanId, AnyArc>;

/// Drives creation and destruction of bean instances
///
/// Shared by the container and every scope handle. Holds the archive tree,
/// the chain builders and the collaborators for proxies and enhancement.
pub struct LifecycleManager {
    root: Arc<BeanManager>,
    archives: RwLock<AHashMap<ArchiveId, Arc<BeanManager>>>,
    interceptors: InterceptorChainBuilder,
    decorators: DecoratorChainBuilder,
    factories: RwLock<AHashMap<BeanId, ReferenceFactory>>,
    proxies: Option<Arc<dyn ProxyProvider>>,
    enhancement: Arc<dyn EnhancementProvider>,
    observers: Observers,
    event_observers: RwLock<Vec<Arc<ObserverMethod>>>,
}

impl LifecycleManager {
    pub(crate) fn new(
        root: Arc<BeanManager>,
        proxies: Option<Arc<dyn ProxyProvider>>,
        enhancement: Arc<dyn EnhancementProvider>,
        observers: Observers,
    ) -> Self {
        let mut archives = AHashMap::new();
        archives.insert(root.archive().clone(), root.clone());
        Self {
            root,
            archives: RwLock::new(archives),
            interceptors: InterceptorChainBuilder::new(),
            decorators: DecoratorChainBuilder::new(),
            factories: RwLock::new(AHashMap::new()),
            proxies,
            enhancement,
            observers,
            event_observers: RwLock::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Arc<BeanManager> {
        &self.root
    }

    pub(crate) fn add_archive(&self, manager: Arc<BeanManager>) {
        self.archives
            .write()
            .insert(manager.archive().clone(), manager);
    }

    /// The manager of `archive`, or the root manager for unknown archives.
    pub fn manager_for(&self, archive: &str) -> Arc<BeanManager> {
        self.archives
            .read()
            .get(archive)
            .cloned()
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn archives(&self) -> Vec<Arc<BeanManager>> {
        let mut all: Vec<_> = self.archives.read().values().cloned().collect();
        all.sort_by(|a, b| a.archive().cmp(b.archive()));
        all
    }

    pub fn interceptors(&self) -> &InterceptorChainBuilder {
        &self.interceptors
    }

    pub fn decorators(&self) -> &DecoratorChainBuilder {
        &self.decorators
    }

    pub(crate) fn add_observer_method(&self, observer: Arc<ObserverMethod>) {
        self.event_observers.write().push(observer);
    }

    pub(crate) fn observer_methods(&self) -> Vec<Arc<ObserverMethod>> {
        self.event_observers.read().clone()
    }

    fn factory_for(&self, bean: &BeanDefinition) -> ReferenceFactory {
        if let Some(factory) = self.factories.read().get(&bean.id()) {
            return factory.clone();
        }
        let factory = match bean.kind() {
            BeanKind::BuiltIn(BuiltIn::Instance) => ReferenceFactory::Instance,
            BeanKind::BuiltIn(BuiltIn::Event) => ReferenceFactory::Event,
            BeanKind::BuiltIn(BuiltIn::InjectionPoint) => ReferenceFactory::InjectionPoint,
            BeanKind::BuiltIn(BuiltIn::Delegate) => ReferenceFactory::Delegate,
            BeanKind::Value(value) => ReferenceFactory::Value(value.clone()),
            BeanKind::Producer(_)
                if bean.scope().is_passivating() && !bean.is_passivation_capable() =>
            {
                ReferenceFactory::Failed(BeanError::IllegalProduct {
                    bean: bean.display(),
                    reason: format!(
                        "products of passivating scope {} must be passivation capable",
                        bean.scope()
                    ),
                })
            }
            _ if bean.scope().is_dependent() => ReferenceFactory::Dependent,
            _ if bean.scope().is_normal() && self.proxies.is_some() => ReferenceFactory::Proxied,
            _ => ReferenceFactory::Contextual,
        };
        tracing::trace!(target: "ferrous_beans::lifecycle", bean = %bean.bean_class(), ?factory, "reference factory");
        self.factories
            .write()
            .entry(bean.id())
            .or_insert(factory)
            .clone()
    }

    /// Resolves `key` in `manager` and obtains a reference below `cc`,
    /// reporting to the registered observers.
    pub(crate) fn lookup(
        self: &Arc<Self>,
        manager: &BeanManager,
        key: &ResolutionKey,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        let observed = self.observers.has_observers();
        let start = observed.then(Instant::now);
        if observed {
            self.observers.resolving(key);
        }
        let result = manager.resolve(key).and_then(|bean| {
            let reference = self.reference(&bean, Some(key), cc, None, contexts)?;
            Ok((bean, reference))
        });
        match result {
            Ok((bean, reference)) => {
                if let Some(start) = start {
                    self.observers.resolved(key, &bean, start.elapsed());
                }
                Ok(reference)
            }
            Err(err) => {
                if observed {
                    self.observers.creation_failed(key, &err);
                }
                Err(err)
            }
        }
    }

    /// A reference to `bean` for injection below `cc`.
    ///
    /// `key` is the request that selected the bean; built-in beans read
    /// their target type and qualifiers from it.
    pub(crate) fn reference(
        self: &Arc<Self>,
        bean: &Arc<BeanDefinition>,
        key: Option<&ResolutionKey>,
        cc: &CreationalContext,
        ip: Option<&InjectionPoint>,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        match self.factory_for(bean) {
            ReferenceFactory::Value(value) => Ok(Some(value)),
            ReferenceFactory::Failed(err) => Err(err),
            ReferenceFactory::Dependent => self.dependent(bean, cc, ip, contexts),
            ReferenceFactory::Contextual => self.contextual(bean, cc, contexts).map(Some),
            ReferenceFactory::Proxied => match &self.proxies {
                Some(provider) => {
                    let lazy = LazyReference::new(Arc::downgrade(self), bean.clone(), contexts.clone());
                    provider.proxy(bean, lazy).map(Some)
                }
                None => self.contextual(bean, cc, contexts).map(Some),
            },
            ReferenceFactory::InjectionPoint => cc
                .injection_point()
                .map(|ip| Some(Arc::new(ip) as AnyArc))
                .ok_or_else(|| {
                    BeanError::IllegalState(
                        "InjectionPoint is only available while injecting a dependent bean".to_string(),
                    )
                }),
            ReferenceFactory::Delegate => cc.delegate().map(Some).ok_or_else(|| {
                BeanError::IllegalState("no decorator delegate is being injected".to_string())
            }),
            ReferenceFactory::Instance => {
                let (ty, qualifiers) = built_in_target(bean, key);
                let instance = Instance::new(
                    Arc::downgrade(self),
                    self.manager_for(bean.archive()),
                    ty,
                    qualifiers,
                    cc.clone(),
                    contexts.clone(),
                );
                Ok(Some(Arc::new(instance)))
            }
            ReferenceFactory::Event => {
                let (ty, qualifiers) = built_in_target(bean, key);
                let event = Event::new(Arc::downgrade(self), ty, qualifiers, contexts.clone());
                Ok(Some(Arc::new(event)))
            }
        }
    }

    fn dependent(
        self: &Arc<Self>,
        bean: &Arc<BeanDefinition>,
        cc: &CreationalContext,
        ip: Option<&InjectionPoint>,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        if let Some(found) = cc.find_in_flight(bean.id()) {
            return match found {
                InFlight::Allocated(instance) => {
                    tracing::trace!(target: "ferrous_beans::lifecycle", bean = %bean.bean_class(), "back-reference to partially built instance");
                    Ok(Some(instance))
                }
                InFlight::Constructing => Err(circular(bean)),
            };
        }
        let _guard = CreationGuard::enter(bean.id(), &bean.display())?;
        let child = cc.child(bean.clone());
        if let Some(ip) = ip {
            child.set_injection_point(ip.clone());
        }
        self.create(bean, &child, contexts)
    }

    /// The instance of a non-dependent bean in its active context, created
    /// on first use.
    pub(crate) fn contextual(
        self: &Arc<Self>,
        bean: &Arc<BeanDefinition>,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<AnyArc> {
        if let Some(found) = cc.find_in_flight(bean.id()) {
            return match found {
                InFlight::Allocated(instance) => Ok(instance),
                InFlight::Constructing => Err(circular(bean)),
            };
        }
        let store = contexts.get(bean.scope())?;
        if let Some(existing) = store.get(bean) {
            return Ok(existing);
        }
        store.get_or_create(bean, &mut || {
            let owner = CreationalContext::owner_within(Some(bean.clone()), Some(cc));
            let outcome = match self.create(bean, &owner, contexts) {
                Ok(Some(instance)) => Ok(Created {
                    instance,
                    context: owner.clone(),
                }),
                Ok(None) => Err(BeanError::IllegalProduct {
                    bean: bean.display(),
                    reason: format!("null product for scope {}", bean.scope()),
                }),
                Err(err) => Err(err),
            };
            if outcome.is_err() {
                if let Err(err) = owner.release() {
                    tracing::warn!(target: "ferrous_beans::lifecycle", bean = %bean.display(), error = %err, "cleanup after failed creation failed");
                }
            }
            outcome
        })
    }

    /// Creates a new instance of `bean` in the entry `cc`.
    pub(crate) fn create(
        self: &Arc<Self>,
        bean: &Arc<BeanDefinition>,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        let manager = self.manager_for(bean.archive());
        let result = match bean.kind() {
            BeanKind::Managed(m) => self.create_managed(&manager, bean, m, cc, contexts).map(Some),
            BeanKind::Producer(p) => self.create_produced(&manager, bean, p, cc, contexts),
            BeanKind::Value(value) => Ok(Some(value.clone())),
            BeanKind::Synthetic { create, destroy } => {
                self.create_synthetic(&manager, bean, create, destroy.as_ref(), cc, contexts)
            }
            BeanKind::BuiltIn(_) => self.reference(bean, None, cc, None, contexts),
        };
        result.map_err(|err| {
            tracing::debug!(target: "ferrous_beans::lifecycle", bean = %bean.display(), error = %err, "creation failed");
            BeanError::creation(bean.display(), err)
        })
    }

    fn create_managed(
        self: &Arc<Self>,
        manager: &Arc<BeanManager>,
        bean: &Arc<BeanDefinition>,
        m: &ManagedBean,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<AnyArc> {
        let class = bean.bean_class().to_string();
        let mut interceptors = InterceptorInstances::new();
        let args = self.resolve_arguments(manager, &m.constructor, cc, contexts)?;

        let around = self.chain(manager, bean, InterceptionType::AroundConstruct, cc, contexts, &mut interceptors)?;
        let instance = if around.is_empty() {
            (m.allocate)(Arguments::for_member(args, class.clone()))?
        } else {
            let specs: Vec<ParamSpec> = match &m.constructor_types {
                Some(types) => types.clone(),
                None => args.iter().map(ParamSpec::like).collect(),
            };
            let allocate = m.allocate.clone();
            let owner = class.clone();
            let mut terminal = move |_: Option<&AnyArc>, params: Vec<Reference>| -> BeanResult<Reference> {
                allocate(Arguments::for_member(params, owner.clone())).map(Some)
            };
            let (_, target) = run_chain(
                InterceptionType::AroundConstruct,
                None,
                None,
                args,
                &specs,
                &around,
                &mut terminal,
            )?;
            target.ok_or_else(|| {
                BeanError::IllegalState(format!("around-construct chain of {} never proceeded", class))
            })?
        };
        cc.push(instance.clone());

        for init in &m.initializers {
            let args = self.resolve_arguments(manager, &init.params, cc, contexts)?;
            (init.apply)(&instance, Arguments::for_member(args, format!("{}.{}", class, init.member)))?;
        }
        cc.advance(LifecycleState::Injected)?;

        let post_construct = self.chain(manager, bean, InterceptionType::PostConstruct, cc, contexts, &mut interceptors)?;
        run_callbacks(InterceptionType::PostConstruct, &instance, &post_construct, m.post_construct.as_ref())?;
        cc.advance(LifecycleState::PostConstructed)?;

        let pre_destroy = self.chain(manager, bean, InterceptionType::PreDestroy, cc, contexts, &mut interceptors)?;
        let declared = m.pre_destroy.clone();
        if declared.is_some() || !pre_destroy.is_empty() {
            cc.on_destroy(Box::new(move |instance| {
                run_callbacks(InterceptionType::PreDestroy, instance, &pre_destroy, declared.as_ref())
            }));
        }

        let enhanced = self.enhance(manager, bean, m, &instance, cc, contexts, &mut interceptors)?;
        let reference = self.decorate(manager, bean, enhanced, cc, contexts)?;
        cc.advance(LifecycleState::Active)?;
        tracing::debug!(target: "ferrous_beans::lifecycle", bean = %bean.display(), "created");
        Ok(reference)
    }

    fn create_produced(
        self: &Arc<Self>,
        manager: &Arc<BeanManager>,
        bean: &Arc<BeanDefinition>,
        p: &Producer,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        let receiver = match &p.declaring {
            Some(declaring) => Some(self.receiver(declaring, cc, contexts)?),
            None => None,
        };
        let args = self.resolve_arguments(manager, &p.params, cc, contexts)?;
        let product = (p.produce)(receiver.as_ref(), Arguments::for_member(args, p.member.clone()))?;

        let Some(product) = product else {
            if bean.scope().is_dependent() {
                return Ok(None);
            }
            return Err(BeanError::IllegalProduct {
                bean: bean.display(),
                reason: format!("{} returned null for scope {}", p.member, bean.scope()),
            });
        };

        cc.push(product.clone());
        cc.advance(LifecycleState::Injected)?;
        cc.advance(LifecycleState::PostConstructed)?;

        if let Some(disposer) = &p.disposer {
            let args = self.resolve_arguments(manager, &disposer.params, cc, contexts)?;
            let dispose = disposer.dispose.clone();
            let member = disposer.member.clone();
            cc.on_destroy(Box::new(move |product| {
                dispose(receiver.as_ref(), product, Arguments::for_member(args, member))
            }));
        }

        let product = self.decorate(manager, bean, product, cc, contexts)?;
        cc.advance(LifecycleState::Active)?;
        Ok(Some(product))
    }

    fn create_synthetic(
        self: &Arc<Self>,
        manager: &Arc<BeanManager>,
        bean: &Arc<BeanDefinition>,
        create: &SyntheticFn,
        destroy: Option<&Callback>,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        let lookup = ContextualLookup {
            lifecycle: self.clone(),
            manager: manager.clone(),
            cc: cc.clone(),
            contexts: contexts.clone(),
        };
        let Some(instance) = create(&lookup)? else {
            if bean.scope().is_dependent() {
                return Ok(None);
            }
            return Err(BeanError::IllegalProduct {
                bean: bean.display(),
                reason: format!("synthetic bean returned null for scope {}", bean.scope()),
            });
        };
        cc.push(instance.clone());
        cc.advance(LifecycleState::Injected)?;
        cc.advance(LifecycleState::PostConstructed)?;
        if let Some(destroy) = destroy.cloned() {
            cc.on_destroy(Box::new(move |instance| destroy(instance)));
        }
        cc.advance(LifecycleState::Active)?;
        Ok(Some(instance))
    }

    /// The declaring instance a producer or observer method is invoked on.
    ///
    /// Contextual receivers bypass client proxies, and intercepted receivers
    /// are unwrapped to the raw instance.
    pub(crate) fn receiver(
        self: &Arc<Self>,
        declaring: &Arc<BeanDefinition>,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<AnyArc> {
        let reference = match self.factory_for(declaring) {
            ReferenceFactory::Contextual | ReferenceFactory::Proxied => {
                Some(self.contextual(declaring, cc, contexts)?)
            }
            _ => self.reference(declaring, None, cc, None, contexts)?,
        };
        let reference = reference.ok_or_else(|| BeanError::NullReference(declaring.display()))?;
        Ok(match reference.downcast_ref::<Intercepted>() {
            Some(intercepted) => intercepted.target_any().clone(),
            None => reference,
        })
    }

    /// Resolves and obtains a reference for each injection point.
    pub(crate) fn resolve_arguments(
        self: &Arc<Self>,
        manager: &BeanManager,
        points: &[InjectionPoint],
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Vec<Reference>> {
        points
            .iter()
            .map(|ip| self.inject(manager, ip, cc, contexts))
            .collect()
    }

    fn inject(
        self: &Arc<Self>,
        manager: &BeanManager,
        ip: &InjectionPoint,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<Reference> {
        if ip.delegate {
            return cc.delegate().map(Some).ok_or_else(|| {
                BeanError::Definition(format!("{} is a delegate injection point outside of a decorator", ip))
            });
        }
        let key = ResolutionKey::new(ip.ty.clone(), &ip.qualifiers);
        let bean = manager.resolve(&key).map_err(|err| err.at(ip))?;
        self.reference(&bean, Some(&key), cc, Some(ip), contexts)
    }

    /// Interceptor chain for a lifecycle callback, with interceptor
    /// instances created as dependents of `cc`.
    fn chain(
        self: &Arc<Self>,
        manager: &BeanManager,
        bean: &Arc<BeanDefinition>,
        interception: InterceptionType,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
        instances: &mut InterceptorInstances,
    ) -> BeanResult<Vec<ChainLink>> {
        let chain = self.interceptors.build(manager, bean, interception, None);
        self.links(&chain, interception, cc, contexts, instances)
    }

    fn links(
        self: &Arc<Self>,
        chain: &[Arc<BeanDefinition>],
        interception: InterceptionType,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
        instances: &mut InterceptorInstances,
    ) -> BeanResult<Vec<ChainLink>> {
        let mut links = Vec::with_capacity(chain.len());
        for interceptor in chain {
            let Some(method) = interceptor
                .interceptor()
                .and_then(|meta| meta.callback(interception))
                .cloned()
            else {
                continue;
            };
            let instance = match instances.get(&interceptor.id()) {
                Some(instance) => instance.clone(),
                None => {
                    let instance = self
                        .reference(interceptor, None, cc, None, contexts)?
                        .ok_or_else(|| BeanError::NullReference(interceptor.display()))?;
                    instances.insert(interceptor.id(), instance.clone());
                    instance
                }
            };
            links.push(ChainLink {
                label: Arc::from(interceptor.bean_class()),
                instance,
                method,
            });
        }
        Ok(links)
    }

    /// Wraps `instance` for business-method interception when any of its
    /// methods has an `AROUND_INVOKE` chain.
    #[allow(clippy::too_many_arguments)]
    fn enhance(
        self: &Arc<Self>,
        manager: &BeanManager,
        bean: &Arc<BeanDefinition>,
        m: &ManagedBean,
        instance: &AnyArc,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
        instances: &mut InterceptorInstances,
    ) -> BeanResult<AnyArc> {
        if m.methods.is_empty() {
            return Ok(instance.clone());
        }
        let mut methods = AHashMap::new();
        let mut intercepted = false;
        for method in &m.methods {
            let chain = self.interceptors.build(manager, bean, InterceptionType::AroundInvoke, Some(method));
            let links = self.links(&chain, InterceptionType::AroundInvoke, cc, contexts, instances)?;
            intercepted |= !links.is_empty();
            methods.insert(
                method.name.clone(),
                MethodChain {
                    method: method.clone(),
                    links: links.into(),
                },
            );
        }
        if !intercepted {
            return Ok(instance.clone());
        }
        self.enhancement
            .enhance(Intercepted::new(bean.clone(), instance.clone(), methods))
    }

    /// Applies the decorators of `bean` around `current`, innermost first.
    fn decorate(
        self: &Arc<Self>,
        manager: &BeanManager,
        bean: &Arc<BeanDefinition>,
        mut current: AnyArc,
        cc: &CreationalContext,
        contexts: &ActiveContexts,
    ) -> BeanResult<AnyArc> {
        let chain = self.decorators.build(manager, bean);
        for decorator in chain.iter() {
            let child = cc.child(decorator.clone());
            child.set_delegate(current.clone());
            current = self
                .create(decorator, &child, contexts)?
                .ok_or_else(|| BeanError::NullReference(decorator.display()))?;
        }
        Ok(current)
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("archives", &self.archives.read().len())
            .field("factories", &self.factories.read().len())
            .field("proxies", &self.proxies.is_some())
            .finish()
    }
}

/// Runs a lifecycle callback chain whose terminal step is the declared
/// callback, if any.
fn run_callbacks(
    interception: InterceptionType,
    instance: &AnyArc,
    links: &[ChainLink],
    declared: Option<&Callback>,
) -> BeanResult<()> {
    if links.is_empty() {
        return match declared {
            Some(callback) => callback(instance),
            None => Ok(()),
        };
    }
    let mut terminal = |target: Option<&AnyArc>, _: Vec<Reference>| -> BeanResult<Reference> {
        if let (Some(callback), Some(target)) = (declared, target) {
            callback(target)?;
        }
        Ok(None)
    };
    run_chain(interception, Some(instance.clone()), None, Vec::new(), &[], links, &mut terminal)?;
    Ok(())
}

fn circular(bean: &BeanDefinition) -> BeanError {
    match CreationGuard::enter(bean.id(), &bean.display()) {
        Err(err) => err,
        Ok(_) => BeanError::Circular(vec![bean.display(), bean.display()]),
    }
}

/// Target type and qualifiers of an `Instance<T>` or `Event<T>` request.
fn built_in_target(bean: &BeanDefinition, key: Option<&ResolutionKey>) -> (BaseType, Vec<Qualifier>) {
    let (ty, qualifiers) = match key {
        Some(key) => (key.ty().clone(), key.qualifiers().to_vec()),
        None => (
            bean.types().first().cloned().unwrap_or_else(BaseType::object),
            bean.qualifiers().iter().filter(|q| !q.is_any()).cloned().collect(),
        ),
    };
    let target = ty.args().first().cloned().unwrap_or_else(BaseType::object);
    (target, qualifiers)
}

/// Lookup bound to one creational context, handed to synthetic beans.
pub(crate) struct ContextualLookup {
    pub(crate) lifecycle: Arc<LifecycleManager>,
    pub(crate) manager: Arc<BeanManager>,
    pub(crate) cc: CreationalContext,
    pub(crate) contexts: ActiveContexts,
}

impl BeanLookupCore for ContextualLookup {
    fn reference_any(&self, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference> {
        let key = ResolutionKey::new(ty.clone(), qualifiers);
        self.lifecycle
            .lookup(&self.manager, &key, &self.cc, &self.contexts)
    }

    fn reference_named(&self, name: &str) -> BeanResult<Reference> {
        let bean = self.manager.resolve_named(name)?;
        self.lifecycle
            .reference(&bean, None, &self.cc, None, &self.contexts)
    }
}
