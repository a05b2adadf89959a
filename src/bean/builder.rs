//! Programmatic construction of bean definitions.

use std::any::{type_name, Any};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::bean::{
    AnyArc, Arguments, BeanDefinition, BeanId, BeanKind, BusinessMethod, Callback, Disposer,
    InitializerMethod, InjectionPoint, ManagedBean, Producer, Reference, Stereotype, SyntheticFn,
    ROOT_ARCHIVE,
};
use crate::decoration::DecoratorMeta;
use crate::error::{BeanError, BeanResult};
use crate::interception::{InterceptorMeta, ParamSpec};
use crate::qualifier::{bean_qualifiers, InterceptorBinding, Qualifier};
use crate::scope::ScopeKind;
use crate::traits::BeanLookupCore;
use crate::types::BaseType;

/// Borrows the concrete target out of a type-erased instance.
pub(crate) fn target<'a, T: Any>(instance: &'a AnyArc, owner: &str) -> BeanResult<&'a T> {
    instance
        .downcast_ref::<T>()
        .ok_or_else(|| BeanError::TypeMismatch {
            bean: owner.to_string(),
            expected: type_name::<T>(),
        })
}

/// Builder for [`BeanDefinition`].
///
/// Applies the implicit rules while building: `@Any` and `@Default`
/// qualifiers, a `@Named` qualifier for named beans, stereotype defaults for
/// scope, name, alternative status and interceptor bindings, and `Object` in
/// the exposed types.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, InjectionPoint, ScopeKind, Qualifier};
///
/// struct Engine;
/// struct Car { engine: std::sync::Arc<Engine> }
///
/// let car = BeanBuilder::new("Car")
///     .types(&["Car", "Vehicle"])
///     .scope(ScopeKind::Singleton)
///     .qualifier(Qualifier::new("Fast"))
///     .constructor(vec![InjectionPoint::of("Engine")], |args| {
///         Ok(Car { engine: args.get::<Engine>(0)? })
///     })
///     .build()
///     .unwrap();
///
/// assert!(car.has_type("Vehicle"));
/// assert!(car.has_type("Object"));
/// assert_eq!(car.qualifiers().len(), 2); // @Any @Fast
/// ```
#[derive(Clone)]
pub struct BeanBuilder {
    bean_class: Arc<str>,
    types: Vec<BaseType>,
    qualifiers: Vec<Qualifier>,
    scope: Option<ScopeKind>,
    name: Option<String>,
    default_name: bool,
    stereotypes: Vec<Arc<Stereotype>>,
    alternative: bool,
    priority: Option<i32>,
    specializes: Option<Arc<str>>,
    archive: Arc<str>,
    eager: bool,
    passivation_capable: bool,
    interceptor_bindings: Vec<InterceptorBinding>,
    interceptor: Option<InterceptorMeta>,
    decorator: Option<DecoratorMeta>,
    constructor: Option<(Vec<InjectionPoint>, crate::bean::Allocator)>,
    constructor_types: Option<Vec<ParamSpec>>,
    initializers: Vec<InitializerMethod>,
    post_construct: Option<Callback>,
    pre_destroy: Option<Callback>,
    methods: Vec<BusinessMethod>,
    kind: Option<BeanKind>,
}

impl BeanBuilder {
    pub fn new(bean_class: impl Into<Arc<str>>) -> Self {
        Self {
            bean_class: bean_class.into(),
            types: Vec::new(),
            qualifiers: Vec::new(),
            scope: None,
            name: None,
            default_name: false,
            stereotypes: Vec::new(),
            alternative: false,
            priority: None,
            specializes: None,
            archive: Arc::from(ROOT_ARCHIVE),
            eager: false,
            passivation_capable: false,
            interceptor_bindings: Vec::new(),
            interceptor: None,
            decorator: None,
            constructor: None,
            constructor_types: None,
            initializers: Vec::new(),
            post_construct: None,
            pre_destroy: None,
            methods: Vec::new(),
            kind: None,
        }
    }

    /// A bean backed by an existing instance.
    pub fn value<T: Any + Send + Sync>(bean_class: impl Into<Arc<str>>, instance: T) -> Self {
        Self::value_raw(bean_class, Arc::new(instance))
    }

    pub fn value_raw(bean_class: impl Into<Arc<str>>, instance: AnyArc) -> Self {
        let mut b = Self::new(bean_class);
        b.kind = Some(BeanKind::Value(instance));
        b
    }

    /// A bean created by a closure over a lookup bound to the creating
    /// context. Dependent references obtained through the lookup are
    /// destroyed with the bean.
    pub fn synthetic<F>(bean_class: impl Into<Arc<str>>, create: F) -> Self
    where
        F: Fn(&dyn BeanLookupCore) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        let mut b = Self::new(bean_class);
        let create: SyntheticFn = Arc::new(create);
        b.kind = Some(BeanKind::Synthetic {
            create,
            destroy: None,
        });
        b
    }

    /// Exposed types. `Object` is always added.
    pub fn types(mut self, types: &[&str]) -> Self {
        self.types.extend(types.iter().map(|t| BaseType::from(*t)));
        self
    }

    pub fn exposed_type(mut self, ty: BaseType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `@Named` without a value: the name is derived from the class name.
    pub fn default_named(mut self) -> Self {
        self.default_name = true;
        self
    }

    pub fn stereotype(mut self, stereotype: Arc<Stereotype>) -> Self {
        for s in stereotype.flatten() {
            if !self.stereotypes.iter().any(|e| e.name == s.name) {
                self.stereotypes.push(s);
            }
        }
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Declares that this bean replaces the bean implemented by `bean_class`.
    pub fn specializes(mut self, bean_class: impl Into<Arc<str>>) -> Self {
        self.specializes = Some(bean_class.into());
        self
    }

    pub fn archive(mut self, archive: impl Into<Arc<str>>) -> Self {
        self.archive = archive.into();
        self
    }

    /// Instantiate at startup. Only meaningful for container-wide scopes.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn passivation_capable(mut self) -> Self {
        self.passivation_capable = true;
        self
    }

    pub fn interceptor_binding(mut self, binding: InterceptorBinding) -> Self {
        self.interceptor_bindings.push(binding);
        self
    }

    /// Marks the bean as an interceptor.
    pub fn interceptor(mut self, meta: InterceptorMeta) -> Self {
        self.interceptor = Some(meta);
        self
    }

    /// Marks the bean as a decorator.
    pub fn decorator(mut self, meta: DecoratorMeta) -> Self {
        self.decorator = Some(meta);
        self
    }

    /// Typed constructor.
    pub fn constructor<T, F>(self, params: Vec<InjectionPoint>, allocate: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arguments) -> BeanResult<T> + Send + Sync + 'static,
    {
        self.constructor_raw(params, move |args| allocate(args).map(|t| Arc::new(t) as AnyArc))
    }

    /// Constructor returning an already type-erased instance, e.g. an
    /// `Arc<Arc<dyn Trait>>`.
    pub fn constructor_raw<F>(mut self, params: Vec<InjectionPoint>, allocate: F) -> Self
    where
        F: Fn(Arguments) -> BeanResult<AnyArc> + Send + Sync + 'static,
    {
        self.constructor = Some((params, Arc::new(allocate)));
        self
    }

    /// Declares the Rust types of the constructor parameters. Around-construct
    /// interceptors may only replace a parameter with a value of its type.
    pub fn constructor_types(mut self, types: Vec<ParamSpec>) -> Self {
        self.constructor_types = Some(types);
        self
    }

    /// Field injection.
    pub fn inject<T, F>(self, point: InjectionPoint, apply: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        let member = point.member.clone();
        self.initializer(member, vec![point], apply)
    }

    /// Initializer method injection.
    pub fn initializer<T, F>(mut self, member: impl Into<String>, params: Vec<InjectionPoint>, apply: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        let owner = self.bean_class.clone();
        self.initializers.push(InitializerMethod {
            member: member.into(),
            params,
            apply: Arc::new(move |instance, args| apply(target::<T>(instance, &owner)?, args)),
        });
        self
    }

    pub fn post_construct<T, F>(mut self, callback: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> BeanResult<()> + Send + Sync + 'static,
    {
        let owner = self.bean_class.clone();
        self.post_construct = Some(Arc::new(move |instance| callback(target::<T>(instance, &owner)?)));
        self
    }

    pub fn pre_destroy<T, F>(mut self, callback: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> BeanResult<()> + Send + Sync + 'static,
    {
        let owner = self.bean_class.clone();
        self.pre_destroy = Some(Arc::new(move |instance| callback(target::<T>(instance, &owner)?)));
        self
    }

    /// An interceptable business method.
    pub fn method<T, F>(mut self, name: &str, params: Vec<ParamSpec>, invoke: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Arguments) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        let owner = self.bean_class.clone();
        self.methods.push(BusinessMethod {
            name: Arc::from(name),
            bindings: Vec::new(),
            params,
            invoke: Arc::new(move |instance, args| invoke(target::<T>(instance, &owner)?, args)),
        });
        self
    }

    /// Adds a method-level interceptor binding to a declared method.
    pub fn method_binding(mut self, name: &str, binding: InterceptorBinding) -> Self {
        if let Some(m) = self.methods.iter_mut().find(|m| &*m.name == name) {
            m.bindings.push(binding);
        }
        self
    }

    /// Turns this bean into a producer-backed bean.
    pub fn producer(mut self, producer: Producer) -> Self {
        self.kind = Some(BeanKind::Producer(producer));
        self
    }

    /// Destroy callback for synthetic beans.
    pub fn on_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&AnyArc) -> BeanResult<()> + Send + Sync + 'static,
    {
        if let Some(BeanKind::Synthetic { destroy: slot, .. }) = &mut self.kind {
            *slot = Some(Arc::new(destroy));
        }
        self
    }

    pub fn bean_class(&self) -> &str {
        &self.bean_class
    }

    pub(crate) fn declared_qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// The explicit name, or the derived one for `@Named` without a value.
    pub(crate) fn declared_name(&self) -> Option<String> {
        match &self.name {
            Some(n) if !n.is_empty() => Some(n.clone()),
            _ if self.default_name || self.stereotypes.iter().any(|s| s.named) => {
                Some(default_bean_name(&self.bean_class))
            }
            _ => None,
        }
    }

    /// `@Typed`: exposes exactly `types` (plus `Object`).
    pub(crate) fn restrict_types(mut self, types: Vec<BaseType>) -> Self {
        self.types = types;
        self
    }

    pub(crate) fn declared_archive(&self) -> &Arc<str> {
        &self.archive
    }

    pub(crate) fn declared_specializes(&self) -> Option<Arc<str>> {
        self.specializes.clone()
    }

    /// True for interceptor and decorator beans.
    pub(crate) fn is_interception_bean(&self) -> bool {
        self.interceptor.is_some() || self.decorator.is_some()
    }

    pub(crate) fn built_in(mut self, kind: crate::bean::BuiltIn) -> Self {
        self.kind = Some(BeanKind::BuiltIn(kind));
        self
    }

    pub fn build(self) -> BeanResult<BeanDefinition> {
        let class = self.bean_class.clone();
        let name = self.declared_name();

        let scope = match self.scope {
            Some(scope) => scope,
            None => {
                let mut declared: Vec<&ScopeKind> = Vec::new();
                for scope in self.stereotypes.iter().filter_map(|s| s.scope.as_ref()) {
                    if !declared.contains(&scope) {
                        declared.push(scope);
                    }
                }
                match declared.as_slice() {
                    [] => ScopeKind::Dependent,
                    [one] => (*one).clone(),
                    _ => {
                        return Err(BeanError::Definition(format!(
                            "{} has conflicting stereotype scopes and declares no scope of its own",
                            class
                        )))
                    }
                }
            }
        };


        let mut explicit = self.qualifiers;
        explicit.retain(|q| !q.is_named());
        if let Some(n) = &name {
            explicit.push(Qualifier::named(n.clone()));
        }

        let mut types = self.types;
        if types.is_empty() {
            types.push(BaseType::class(class.clone()));
        }
        if let Some(open) = types.iter().find(|t| matches!(t, BaseType::Wildcard { .. }) || t.args().iter().any(|a| matches!(a, BaseType::Wildcard { .. }))) {
            return Err(BeanError::Definition(format!(
                "{} exposes wildcard type {}",
                class, open
            )));
        }
        let object = BaseType::object();
        if !types.contains(&object) {
            types.push(object);
        }
        let mut deduped: Vec<BaseType> = Vec::with_capacity(types.len());
        for t in types {
            if !deduped.contains(&t) {
                deduped.push(t);
            }
        }

        let alternative = self.alternative || self.stereotypes.iter().any(|s| s.alternative);

        let mut bindings = self.interceptor_bindings;
        for s in &self.stereotypes {
            for b in &s.interceptor_bindings {
                if !bindings.contains(b) {
                    bindings.push(b.clone());
                }
            }
        }

        let kind = match (self.kind, self.constructor) {
            (Some(kind), None) => kind,
            (Some(_), Some(_)) => {
                return Err(BeanError::Definition(format!(
                    "{} declares both a constructor and another production strategy",
                    class
                )))
            }
            (None, Some((constructor, allocate))) => {
                if let Some(types) = &self.constructor_types {
                    if types.len() != constructor.len() {
                        return Err(BeanError::Definition(format!(
                            "{} declares {} constructor parameter types for {} parameters",
                            class,
                            types.len(),
                            constructor.len()
                        )));
                    }
                }
                BeanKind::Managed(ManagedBean {
                    constructor,
                    constructor_types: self.constructor_types,
                    allocate,
                    initializers: self.initializers,
                    post_construct: self.post_construct,
                    pre_destroy: self.pre_destroy,
                    methods: self.methods,
                })
            }
            (None, None) => {
                return Err(BeanError::Definition(format!(
                    "{} has no constructor, value or producer",
                    class
                )))
            }
        };

        if self.eager && !scope.is_container_wide() {
            return Err(BeanError::Definition(format!(
                "{} is eager but has scope {}",
                class, scope
            )));
        }

        Ok(BeanDefinition {
            id: BeanId::next(),
            bean_class: class,
            types: deduped,
            qualifiers: bean_qualifiers(explicit),
            scope,
            name,
            stereotypes: self.stereotypes,
            alternative,
            priority: self.priority,
            specializes: self.specializes,
            archive: self.archive,
            eager: self.eager,
            passivation_capable: self.passivation_capable,
            interceptor_bindings: bindings,
            interceptor: self.interceptor.map(Arc::new),
            decorator: self.decorator.map(Arc::new),
            kind,
            passivation_id: OnceCell::new(),
        })
    }
}

/// `ShopService` becomes `shopService`; package prefixes are dropped.
pub(crate) fn default_bean_name(class: &str) -> String {
    let simple = class.rsplit(['.', ':']).next().unwrap_or(class);
    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builder for [`Producer`] members.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, ProducerBuilder, ScopeKind};
///
/// struct Factory { prefix: String }
/// struct Label(String);
///
/// let factory = std::sync::Arc::new(
///     BeanBuilder::new("Factory")
///         .scope(ScopeKind::Singleton)
///         .constructor(vec![], |_| Ok(Factory { prefix: "x-".into() }))
///         .build()
///         .unwrap(),
/// );
///
/// let producer = ProducerBuilder::method(Some(factory), "Factory.label")
///     .produce(|f: &Factory, _args| Ok(Some(Label(format!("{}1", f.prefix)))))
///     .build()
///     .unwrap();
///
/// let label = BeanBuilder::new("Label").producer(producer).build().unwrap();
/// assert!(label.is_producer());
/// ```
#[derive(Clone)]
pub struct ProducerBuilder {
    declaring: Option<Arc<BeanDefinition>>,
    member: String,
    params: Vec<InjectionPoint>,
    produce: Option<crate::bean::ProduceFn>,
    disposer: Option<Disposer>,
    field: bool,
}

impl ProducerBuilder {
    pub fn method(declaring: Option<Arc<BeanDefinition>>, member: impl Into<String>) -> Self {
        Self {
            declaring,
            member: member.into(),
            params: Vec::new(),
            produce: None,
            disposer: None,
            field: false,
        }
    }

    pub fn field(declaring: Option<Arc<BeanDefinition>>, member: impl Into<String>) -> Self {
        let mut b = Self::method(declaring, member);
        b.field = true;
        b
    }

    pub fn param(mut self, point: InjectionPoint) -> Self {
        self.params.push(point);
        self
    }

    pub(crate) fn declared_by(mut self, declaring: Option<Arc<BeanDefinition>>) -> Self {
        self.declaring = declaring;
        self
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// Producer on an instance of `D`.
    pub fn produce<D, T, F>(mut self, produce: F) -> Self
    where
        D: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&D, Arguments) -> BeanResult<Option<T>> + Send + Sync + 'static,
    {
        let member = self.member.clone();
        self.produce = Some(Arc::new(move |receiver, args| {
            let receiver = receiver.ok_or_else(|| {
                BeanError::IllegalState(format!("{} requires a declaring instance", member))
            })?;
            let product = produce(target::<D>(receiver, &member)?, args)?;
            Ok(product.map(|p| Arc::new(p) as AnyArc))
        }));
        self
    }

    /// Static producer.
    pub fn produce_static<T, F>(mut self, produce: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arguments) -> BeanResult<Option<T>> + Send + Sync + 'static,
    {
        self.produce = Some(Arc::new(move |_, args| {
            Ok(produce(args)?.map(|p| Arc::new(p) as AnyArc))
        }));
        self
    }

    pub fn produce_raw<F>(mut self, produce: F) -> Self
    where
        F: Fn(Option<&AnyArc>, Arguments) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        self.produce = Some(Arc::new(produce));
        self
    }

    /// Disposer receiving the product as `T`.
    pub fn disposes<T, F>(mut self, member: impl Into<String>, params: Vec<InjectionPoint>, dispose: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Arguments) -> BeanResult<()> + Send + Sync + 'static,
    {
        let member = member.into();
        let owner = member.clone();
        self.disposer = Some(Disposer {
            member,
            params,
            dispose: Arc::new(move |_, product, args| dispose(target::<T>(product, &owner)?, args)),
        });
        self
    }

    pub fn disposer(mut self, disposer: Disposer) -> Self {
        self.disposer = Some(disposer);
        self
    }

    pub fn build(self) -> BeanResult<Producer> {
        let produce = self.produce.ok_or_else(|| {
            BeanError::Definition(format!("producer {} has no body", self.member))
        })?;
        if self.field && !self.params.is_empty() {
            return Err(BeanError::Definition(format!(
                "producer field {} cannot have parameters",
                self.member
            )));
        }
        Ok(Producer {
            declaring: self.declaring,
            member: self.member,
            params: self.params,
            produce,
            disposer: self.disposer,
            field: self.field,
        })
    }
}
