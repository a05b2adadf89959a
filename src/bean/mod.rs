//! Bean definitions and their production strategies.
//!
//! A [`BeanDefinition`] is immutable once it has been indexed. How an
//! instance is obtained is captured by [`BeanKind`], a sum type over the
//! supported strategies rather than a hierarchy of bean classes.

mod builder;
mod injection;

pub use builder::{BeanBuilder, ProducerBuilder};
pub(crate) use builder::{default_bean_name, target};
pub use injection::{downcast, downcast_trait, Arguments, InjectionPoint, MemberKind};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::decoration::DecoratorMeta;
use crate::error::BeanResult;
use crate::interception::{InterceptorMeta, ParamSpec};
use crate::qualifier::{display_qualifiers, InterceptorBinding, QualifierSet};
use crate::scope::ScopeKind;
use crate::traits::BeanLookupCore;
use crate::types::BaseType;

/// Type-erased shared instance.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// A contextual reference as produced by the container. `None` is a null
/// product of a dependent producer.
pub type Reference = Option<AnyArc>;

/// Identifier of the archive (module) a bean was declared in.
pub type ArchiveId = Arc<str>;

/// Archive that owns beans registered without an explicit archive.
pub const ROOT_ARCHIVE: &str = "root";

/// Allocates a managed bean from its resolved constructor arguments.
pub type Allocator = Arc<dyn Fn(Arguments) -> BeanResult<AnyArc> + Send + Sync>;

/// Lifecycle callback receiving the target instance.
pub type Callback = Arc<dyn Fn(&AnyArc) -> BeanResult<()> + Send + Sync>;

/// Runs an initializer method or field assignment on a built instance.
pub type Initializer = Arc<dyn Fn(&AnyArc, Arguments) -> BeanResult<()> + Send + Sync>;

/// Invokes a business method on the target instance.
pub type MethodInvoker = Arc<dyn Fn(&AnyArc, Arguments) -> BeanResult<Reference> + Send + Sync>;

/// Produces a value from an optional declaring instance.
pub type ProduceFn = Arc<dyn Fn(Option<&AnyArc>, Arguments) -> BeanResult<Reference> + Send + Sync>;

/// Disposes a produced value. Receives the declaring instance, the product
/// and the disposer's remaining arguments.
pub type DisposeFn =
    Arc<dyn Fn(Option<&AnyArc>, &AnyArc, Arguments) -> BeanResult<()> + Send + Sync>;

/// Creates a synthetic bean through a lookup bound to the creating context.
pub type SyntheticFn = Arc<dyn Fn(&dyn BeanLookupCore) -> BeanResult<Reference> + Send + Sync>;

static NEXT_BEAN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique bean identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(u64);

impl BeanId {
    pub(crate) fn next() -> Self {
        BeanId(NEXT_BEAN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stereotype: a reusable bundle of bean metadata.
#[derive(Debug, Clone, Default)]
pub struct Stereotype {
    pub name: Arc<str>,
    /// Default scope for beans that declare none.
    pub scope: Option<ScopeKind>,
    /// Beans get a default name derived from their class.
    pub named: bool,
    /// Beans carrying the stereotype are alternatives.
    pub alternative: bool,
    pub interceptor_bindings: Vec<InterceptorBinding>,
    /// Explicit priority; enables the stereotype globally.
    pub priority: Option<i32>,
    /// Nested stereotypes, already flattened by the declarer.
    pub inherits: Vec<Arc<Stereotype>>,
}

impl Stereotype {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    pub fn named(mut self) -> Self {
        self.named = true;
        self
    }

    pub fn with_binding(mut self, binding: InterceptorBinding) -> Self {
        self.interceptor_bindings.push(binding);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// This stereotype followed by every stereotype it inherits.
    pub fn flatten(self: &Arc<Self>) -> Vec<Arc<Stereotype>> {
        let mut out = vec![self.clone()];
        let mut idx = 0;
        while idx < out.len() {
            let nested = out[idx].inherits.clone();
            for s in nested {
                if !out.iter().any(|o| o.name == s.name) {
                    out.push(s);
                }
            }
            idx += 1;
        }
        out
    }
}

/// A constructor-built bean.
#[derive(Clone)]
pub struct ManagedBean {
    pub constructor: Vec<InjectionPoint>,
    /// Declared parameter types seen by around-construct interceptors. When
    /// absent each parameter keeps the type of the value injected into it.
    pub constructor_types: Option<Vec<ParamSpec>>,
    pub allocate: Allocator,
    pub initializers: Vec<InitializerMethod>,
    pub post_construct: Option<Callback>,
    pub pre_destroy: Option<Callback>,
    pub methods: Vec<BusinessMethod>,
}

/// A field or initializer-method injection program.
#[derive(Clone)]
pub struct InitializerMethod {
    pub member: String,
    pub params: Vec<InjectionPoint>,
    pub apply: Initializer,
}

/// A method on a bean that can be intercepted.
#[derive(Clone)]
pub struct BusinessMethod {
    pub name: Arc<str>,
    /// Method-level interceptor bindings.
    pub bindings: Vec<InterceptorBinding>,
    pub params: Vec<ParamSpec>,
    pub invoke: MethodInvoker,
}

/// A producer method or field.
#[derive(Clone)]
pub struct Producer {
    /// The bean declaring the producer; `None` for static members.
    pub declaring: Option<Arc<BeanDefinition>>,
    pub member: String,
    pub params: Vec<InjectionPoint>,
    pub produce: ProduceFn,
    pub disposer: Option<Disposer>,
    /// Producer fields have no parameters.
    pub field: bool,
}

/// A disposer method matching a producer.
#[derive(Clone)]
pub struct Disposer {
    pub member: String,
    /// Parameters other than the disposed one.
    pub params: Vec<InjectionPoint>,
    pub dispose: DisposeFn,
}

/// Beans the container provides itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltIn {
    /// `Instance<T>` programmatic lookup.
    Instance,
    /// `Event<T>` firing handle.
    Event,
    /// Metadata of the injection point being injected.
    InjectionPoint,
    /// The delegate of the decorator under construction.
    Delegate,
}

/// How an instance of a bean is obtained.
#[derive(Clone)]
pub enum BeanKind {
    Managed(ManagedBean),
    Producer(Producer),
    /// A pre-built instance.
    Value(AnyArc),
    Synthetic {
        create: SyntheticFn,
        destroy: Option<Callback>,
    },
    BuiltIn(BuiltIn),
}

impl BeanKind {
    fn label(&self) -> &'static str {
        match self {
            BeanKind::Managed(_) => "ManagedBean",
            BeanKind::Producer(p) if p.field => "ProducesFieldBean",
            BeanKind::Producer(_) => "ProducesMethodBean",
            BeanKind::Value(_) => "SingletonBean",
            BeanKind::Synthetic { .. } => "SyntheticBean",
            BeanKind::BuiltIn(_) => "BuiltInBean",
        }
    }
}

/// Registered bean metadata.
///
/// Qualifiers always contain `@Any` and either explicit qualifiers or
/// `@Default`. The passivation id is derived lazily from the bean's identity
/// and then fixed.
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) id: BeanId,
    pub(crate) bean_class: Arc<str>,
    pub(crate) types: Vec<BaseType>,
    pub(crate) qualifiers: QualifierSet,
    pub(crate) scope: ScopeKind,
    pub(crate) name: Option<String>,
    pub(crate) stereotypes: Vec<Arc<Stereotype>>,
    pub(crate) alternative: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) specializes: Option<Arc<str>>,
    pub(crate) archive: ArchiveId,
    pub(crate) eager: bool,
    pub(crate) passivation_capable: bool,
    pub(crate) interceptor_bindings: Vec<InterceptorBinding>,
    pub(crate) interceptor: Option<Arc<InterceptorMeta>>,
    pub(crate) decorator: Option<Arc<DecoratorMeta>>,
    pub(crate) kind: BeanKind,
    pub(crate) passivation_id: OnceCell<String>,
}

impl BeanDefinition {
    pub fn id(&self) -> BeanId {
        self.id
    }

    /// The implementation class, or the declaring member for producers.
    pub fn bean_class(&self) -> &str {
        &self.bean_class
    }

    pub fn types(&self) -> &[BaseType] {
        &self.types
    }

    pub fn qualifiers(&self) -> &QualifierSet {
        &self.qualifiers
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stereotypes(&self) -> &[Arc<Stereotype>] {
        &self.stereotypes
    }

    pub fn is_alternative(&self) -> bool {
        self.alternative
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Class name of the bean this one specializes.
    pub fn specializes(&self) -> Option<&str> {
        self.specializes.as_deref()
    }

    pub fn archive(&self) -> &ArchiveId {
        &self.archive
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn kind(&self) -> &BeanKind {
        &self.kind
    }

    pub fn interceptor_bindings(&self) -> &[InterceptorBinding] {
        &self.interceptor_bindings
    }

    pub fn interceptor(&self) -> Option<&Arc<InterceptorMeta>> {
        self.interceptor.as_ref()
    }

    pub fn decorator(&self) -> Option<&Arc<DecoratorMeta>> {
        self.decorator.as_ref()
    }

    pub fn is_producer(&self) -> bool {
        matches!(self.kind, BeanKind::Producer(_))
    }

    pub fn built_in(&self) -> Option<BuiltIn> {
        match self.kind {
            BeanKind::BuiltIn(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_passivation_capable(&self) -> bool {
        self.passivation_capable
    }

    /// Every injection point the bean declares, in creation order.
    pub fn injection_points(&self) -> Vec<&InjectionPoint> {
        match &self.kind {
            BeanKind::Managed(m) => m
                .constructor
                .iter()
                .chain(m.initializers.iter().flat_map(|i| i.params.iter()))
                .collect(),
            BeanKind::Producer(p) => p
                .params
                .iter()
                .chain(p.disposer.iter().flat_map(|d| d.params.iter()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_type(&self, raw: &str) -> bool {
        self.types.iter().any(|t| t.raw_name() == raw)
    }

    /// Stable identifier used by passivation handles.
    ///
    /// Hashes the bean class, the sorted exposed types, the binding part of
    /// the qualifiers and the name, so it survives restarts as long as the
    /// metadata is unchanged.
    pub fn passivation_id(&self) -> &str {
        self.passivation_id.get_or_init(|| {
            let mut types: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
            types.sort();
            let mut hasher = Sha256::new();
            hasher.update(self.kind.label().as_bytes());
            hasher.update(b"|");
            hasher.update(self.bean_class.as_bytes());
            hasher.update(b"|");
            hasher.update(types.join(",").as_bytes());
            hasher.update(b"|");
            let qualifiers: Vec<String> = self.qualifiers.iter().map(|q| q.binding_key()).collect();
            hasher.update(qualifiers.join(" ").as_bytes());
            hasher.update(b"|");
            hasher.update(self.name.as_deref().unwrap_or("").as_bytes());
            STANDARD.encode(hasher.finalize())
        })
    }

    /// Display string used in diagnostics and ambiguity reports.
    pub fn display(&self) -> String {
        let mut out = format!("{}[{}", self.kind.label(), self.bean_class);
        if let Some(name) = &self.name {
            out.push_str(&format!(", name={}", name));
        }
        out.push_str(&format!(", {}", display_qualifiers(&self.qualifiers)));
        if !self.scope.is_dependent() {
            out.push_str(&format!(", {}", self.scope));
        }
        if self.alternative {
            out.push_str(", @Alternative");
        }
        out.push(']');
        out
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("id", &self.id)
            .field("bean_class", &self.bean_class)
            .field("types", &self.types)
            .field("qualifiers", &self.qualifiers)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("alternative", &self.alternative)
            .field("archive", &self.archive)
            .finish()
    }
}

impl PartialEq for BeanDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BeanDefinition {}

impl std::hash::Hash for BeanDefinition {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
