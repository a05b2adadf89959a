//! Decorators: beans that wrap other beans of a shared type.
//!
//! A decorator declares a `@Delegate` injection point. It applies to every
//! bean with an exposed type the delegate type is assignable from and with
//! qualifiers satisfying the delegate's. Decorators are applied in chain
//! order, each receiving the previous result as its delegate, so the last one
//! in the chain is the outermost wrapper and sees calls first.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanId, InjectionPoint};
use crate::interception::{enabled_in_order, ChainBeans};
use crate::qualifier::{Qualifier, QualifierMatcher};
use crate::resolver::BeanManager;
use crate::types::{BaseType, TypeHierarchy};

/// Decorator metadata attached to a bean definition.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BeanBuilder, DecoratorMeta};
///
/// trait Greeting: Send + Sync { fn text(&self) -> String; }
/// struct Polite(Arc<dyn Greeting>);
/// impl Greeting for Polite {
///     fn text(&self) -> String { format!("{}, please", self.0.text()) }
/// }
///
/// let meta = DecoratorMeta::of("Greeting");
/// let decorator = BeanBuilder::new("Polite")
///     .types(&["Greeting"])
///     .decorator(meta.clone())
///     .priority(10)
///     .constructor_raw(vec![meta.delegate_point()], |args| {
///         let inner = args.get_trait::<dyn Greeting>(0)?;
///         Ok(Arc::new(Arc::new(Polite(inner)) as Arc<dyn Greeting>))
///     })
///     .build()
///     .unwrap();
/// assert!(decorator.decorator().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct DecoratorMeta {
    delegate: InjectionPoint,
    decorated_types: Vec<BaseType>,
}

impl DecoratorMeta {
    pub fn new(delegate: InjectionPoint) -> Self {
        Self {
            delegate: delegate.as_delegate(),
            decorated_types: Vec::new(),
        }
    }

    /// Decorator whose delegate is of type `ty`.
    pub fn of(ty: &str) -> Self {
        Self::new(InjectionPoint::of(ty).at("@Delegate"))
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.delegate = self.delegate.qualified(qualifier);
        self
    }

    /// Adds a type the decorator implements and decorates.
    pub fn decorates(mut self, ty: &str) -> Self {
        self.decorated_types.push(BaseType::from(ty));
        self
    }

    pub fn delegate(&self) -> &InjectionPoint {
        &self.delegate
    }

    /// The delegate injection point, for use in the decorator's constructor
    /// or initializer.
    pub fn delegate_point(&self) -> InjectionPoint {
        self.delegate.clone()
    }

    /// Decorated types; the delegate type when none were declared.
    pub fn decorated_types(&self) -> Vec<BaseType> {
        if self.decorated_types.is_empty() {
            vec![self.delegate.ty.clone()]
        } else {
            self.decorated_types.clone()
        }
    }

    /// True if this decorator wraps `bean`.
    pub fn applies_to(&self, bean: &BeanDefinition, hierarchy: &dyn TypeHierarchy) -> bool {
        if bean.decorator().is_some() || bean.interceptor().is_some() || bean.built_in().is_some() {
            return false;
        }
        let type_ok = bean
            .types()
            .iter()
            .any(|t| !t.is_object() && self.delegate.ty.is_assignable_from(t, hierarchy));
        type_ok
            && QualifierMatcher::matches_all(&self.delegate.required_qualifiers(), bean.qualifiers())
    }
}

/// Selects and orders the decorators of a bean.
#[derive(Default)]
pub struct DecoratorChainBuilder {
    cache: RwLock<AHashMap<BeanId, ChainBeans>>,
}

impl DecoratorChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decorators of `bean` in application order, innermost first.
    pub fn build(&self, manager: &BeanManager, bean: &BeanDefinition) -> ChainBeans {
        if let Some(chain) = self.cache.read().get(&bean.id()) {
            return chain.clone();
        }

        let hierarchy = manager.hierarchy().clone();
        let candidates: Vec<Arc<BeanDefinition>> = manager
            .visible_beans()
            .into_iter()
            .filter(|d| {
                d.decorator()
                    .map_or(false, |meta| meta.applies_to(bean, &*hierarchy))
            })
            .collect();

        let (listed, frozen) = {
            let deployment = manager.deployment();
            (deployment.decorators().to_vec(), deployment.is_frozen())
        };
        let chain: ChainBeans = enabled_in_order(&listed, candidates).into();
        if !chain.is_empty() {
            tracing::trace!(
                target: "ferrous_beans::decorator",
                bean = %bean.bean_class(),
                decorators = chain.len(),
                "decorator chain built"
            );
        }
        if frozen {
            self.cache.write().insert(bean.id(), chain.clone());
        }
        chain
    }
}

impl fmt::Debug for DecoratorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorChainBuilder")
            .field("cached", &self.cache.read().len())
            .finish()
    }
}
