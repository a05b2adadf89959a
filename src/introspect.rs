//! Pre-parsed type metadata handed to discovery.
//!
//! The container never reflects over classes itself. A [`TypeIntrospector`]
//! turns a class name into an [`AnnotatedType`]: the class's annotations in
//! declaration order plus the program that builds and injects an instance.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bean::{BeanBuilder, ProducerBuilder, Stereotype};
use crate::error::BeanResult;
use crate::event::ObserverMethod;
use crate::qualifier::{InterceptorBinding, Qualifier};
use crate::scope::ScopeKind;
use crate::types::BaseType;

/// Annotations the container understands.
#[derive(Debug, Clone)]
pub enum Annotation {
    Scope(ScopeKind),
    Qualifier(Qualifier),
    /// `@Named`, with the default name when no value is given.
    Named(Option<String>),
    Stereotype(Arc<Stereotype>),
    Alternative,
    Priority(i32),
    /// Replaces the direct superclass.
    Specializes,
    /// Excludes the type from discovery.
    Vetoed,
    /// Instantiate at startup.
    Eager,
    PassivationCapable,
    InterceptorBinding(InterceptorBinding),
    /// `@Typed`: restricts the exposed types.
    Typed(Vec<BaseType>),
}

impl Annotation {
    /// Scopes and stereotypes make a type a bean in `annotated` discovery.
    pub fn is_bean_defining(&self) -> bool {
        matches!(self, Annotation::Scope(_) | Annotation::Stereotype(_))
    }
}

/// A producer method or field declared on an annotated type.
#[derive(Clone)]
pub struct ProducerMember {
    pub(crate) producer: ProducerBuilder,
    pub(crate) is_static: bool,
    pub(crate) types: Vec<BaseType>,
    pub(crate) annotations: Vec<Annotation>,
}

impl ProducerMember {
    pub fn new(producer: ProducerBuilder) -> Self {
        Self {
            producer,
            is_static: false,
            types: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// The member does not need a declaring instance.
    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn types(mut self, types: &[&str]) -> Self {
        self.types.extend(types.iter().map(|t| BaseType::from(*t)));
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn member(&self) -> &str {
        self.producer.member()
    }
}

/// Discovery-time view of one class.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{AnnotatedType, Annotation, BeanBuilder, ScopeKind};
///
/// struct Clock;
///
/// let ty = AnnotatedType::new("com.acme.Clock")
///     .annotate(Annotation::Scope(ScopeKind::Application))
///     .program(BeanBuilder::new("com.acme.Clock").constructor(vec![], |_| Ok(Clock)));
///
/// assert!(ty.is_bean_defining());
/// assert!(ty.has_constructor());
/// ```
#[derive(Clone)]
pub struct AnnotatedType {
    class_name: Arc<str>,
    superclass: Option<Arc<str>>,
    types: Vec<BaseType>,
    annotations: Vec<Annotation>,
    program: Option<BeanBuilder>,
    producers: Vec<ProducerMember>,
    observers: Vec<ObserverMethod>,
}

impl AnnotatedType {
    pub fn new(class_name: impl Into<Arc<str>>) -> Self {
        Self {
            class_name: class_name.into(),
            superclass: None,
            types: Vec::new(),
            annotations: Vec::new(),
            program: None,
            producers: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<Arc<str>>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Exposed types besides the class itself.
    pub fn types(mut self, types: &[&str]) -> Self {
        self.types.extend(types.iter().map(|t| BaseType::from(*t)));
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// How instances are built and injected. Types without a program are
    /// not managed beans but may still declare static producers.
    pub fn program(mut self, program: BeanBuilder) -> Self {
        self.program = Some(program);
        self
    }

    pub fn producer(mut self, producer: ProducerMember) -> Self {
        self.producers.push(producer);
        self
    }

    pub fn observer(mut self, observer: ObserverMethod) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    pub fn exposed_types(&self) -> &[BaseType] {
        &self.types
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<Annotation> {
        &mut self.annotations
    }

    pub fn has_constructor(&self) -> bool {
        self.program.is_some()
    }

    pub fn producers(&self) -> &[ProducerMember] {
        &self.producers
    }

    pub fn observers(&self) -> &[ObserverMethod] {
        &self.observers
    }

    pub fn is_vetoed(&self) -> bool {
        self.annotations.iter().any(|a| matches!(a, Annotation::Vetoed))
    }

    pub fn is_specializing(&self) -> bool {
        self.annotations.iter().any(|a| matches!(a, Annotation::Specializes))
    }

    /// A scope, a stereotype, or an interceptor or decorator program.
    pub fn is_bean_defining(&self) -> bool {
        self.annotations.iter().any(Annotation::is_bean_defining)
            || self
                .program
                .as_ref()
                .map_or(false, BeanBuilder::is_interception_bean)
    }

    pub(crate) fn into_parts(self) -> AnnotatedParts {
        AnnotatedParts {
            class_name: self.class_name,
            superclass: self.superclass,
            types: self.types,
            annotations: self.annotations,
            program: self.program,
            producers: self.producers,
            observers: self.observers,
        }
    }
}

impl fmt::Debug for AnnotatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotatedType")
            .field("class_name", &self.class_name)
            .field("superclass", &self.superclass)
            .field("annotations", &self.annotations)
            .field("producers", &self.producers.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

pub(crate) struct AnnotatedParts {
    pub(crate) class_name: Arc<str>,
    pub(crate) superclass: Option<Arc<str>>,
    pub(crate) types: Vec<BaseType>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) program: Option<BeanBuilder>,
    pub(crate) producers: Vec<ProducerMember>,
    pub(crate) observers: Vec<ObserverMethod>,
}

/// Supplies metadata for class names.
///
/// Implementations must report annotations in a stable order so discovery
/// is repeatable.
pub trait TypeIntrospector: Send + Sync {
    /// Metadata for `class_name`, or `None` when the class cannot be loaded.
    fn introspect(&self, class_name: &str) -> BeanResult<Option<AnnotatedType>>;

    fn is_available(&self, class_name: &str) -> bool;
}

/// Introspector over registered fixtures.
#[derive(Default)]
pub struct StaticIntrospector {
    types: RwLock<AHashMap<String, AnnotatedType>>,
}

impl StaticIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, annotated: AnnotatedType) {
        self.types
            .write()
            .insert(annotated.class_name().to_string(), annotated);
    }

    pub fn with(self, annotated: AnnotatedType) -> Self {
        self.register(annotated);
        self
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TypeIntrospector for StaticIntrospector {
    fn introspect(&self, class_name: &str) -> BeanResult<Option<AnnotatedType>> {
        Ok(self.types.read().get(class_name).cloned())
    }

    fn is_available(&self, class_name: &str) -> bool {
        self.types.read().contains_key(class_name)
    }
}

impl fmt::Debug for StaticIntrospector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticIntrospector")
            .field("types", &self.len())
            .finish()
    }
}
