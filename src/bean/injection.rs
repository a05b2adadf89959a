//! Injection points and argument lists.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::bean::{AnyArc, Reference};
use crate::error::{BeanError, BeanResult};
use crate::qualifier::{display_qualifiers, request_qualifiers, Qualifier, QualifierSet};
use crate::types::BaseType;

/// What kind of member an injection point belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    /// Parameter `index` of a constructor, initializer, producer or observer.
    Parameter { index: usize },
}

/// A required dependency: a type plus qualifiers, together with where it is
/// declared.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{InjectionPoint, Qualifier};
///
/// let ip = InjectionPoint::of("Widget")
///     .qualified(Qualifier::new("Fast"))
///     .at("Shop.widget");
/// assert_eq!(ip.to_string(), "Widget @Fast at Shop.widget");
/// ```
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub ty: BaseType,
    /// Required qualifiers as declared; empty means `@Default`.
    pub qualifiers: Vec<Qualifier>,
    /// Display location, e.g. `Shop.widget` or `Shop(1)`.
    pub member: String,
    pub kind: MemberKind,
    /// The `@Delegate` point of a decorator.
    pub delegate: bool,
    /// Excluded from passivation checks.
    pub transient: bool,
}

impl InjectionPoint {
    pub fn new(ty: BaseType) -> Self {
        Self {
            ty,
            qualifiers: Vec::new(),
            member: String::new(),
            kind: MemberKind::Field,
            delegate: false,
            transient: false,
        }
    }

    /// Parses the type expression; see [`BaseType::parse`].
    pub fn of(ty: &str) -> Self {
        Self::new(BaseType::from(ty))
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn at(mut self, member: impl Into<String>) -> Self {
        self.member = member.into();
        self
    }

    pub fn parameter(mut self, index: usize) -> Self {
        self.kind = MemberKind::Parameter { index };
        self
    }

    pub fn as_delegate(mut self) -> Self {
        self.delegate = true;
        self
    }

    pub fn as_transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// The normalized required qualifier set.
    pub fn required_qualifiers(&self) -> QualifierSet {
        request_qualifiers(&self.qualifiers)
    }

    /// `Type @Q1 @Q2` without the location.
    pub fn requested(&self) -> String {
        format!("{} {}", self.ty, display_qualifiers(&self.required_qualifiers()))
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.requested())?;
        if !self.member.is_empty() {
            write!(f, " at {}", self.member)?;
        }
        Ok(())
    }
}

/// Resolved arguments handed to constructors, initializers, producers,
/// disposers and observers.
///
/// `None` entries are null dependent products.
#[derive(Default)]
pub struct Arguments {
    values: Vec<Reference>,
    owner: String,
}

impl Arguments {
    pub fn new(values: Vec<Reference>) -> Self {
        Self {
            values,
            owner: String::new(),
        }
    }

    pub(crate) fn for_member(values: Vec<Reference>, owner: impl Into<String>) -> Self {
        Self {
            values,
            owner: owner.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed access to argument `index`.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> BeanResult<Arc<T>> {
        match self.optional::<T>(index)? {
            Some(value) => Ok(value),
            None => Err(BeanError::NullReference(self.location(index))),
        }
    }

    /// Typed access to argument `index`, allowing null.
    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> BeanResult<Option<Arc<T>>> {
        match self.raw(index)? {
            Some(value) => downcast::<T>(value.clone(), &self.location(index)).map(Some),
            None => Ok(None),
        }
    }

    /// Access to an argument holding a trait object stored as `Arc<Arc<dyn T>>`.
    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> BeanResult<Arc<T>> {
        match self.raw(index)? {
            Some(value) => downcast_trait::<T>(value.clone(), &self.location(index)),
            None => Err(BeanError::NullReference(self.location(index))),
        }
    }

    /// Untyped access to argument `index`.
    pub fn raw(&self, index: usize) -> BeanResult<&Reference> {
        self.values.get(index).ok_or_else(|| BeanError::InvalidParameters {
            target: self.owner.clone(),
            reason: format!("no argument at index {} (have {})", index, self.values.len()),
        })
    }

    pub fn into_values(self) -> Vec<Reference> {
        self.values
    }

    fn location(&self, index: usize) -> String {
        if self.owner.is_empty() {
            format!("argument {}", index)
        } else {
            format!("{}({})", self.owner, index)
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("len", &self.values.len())
            .finish()
    }
}

/// Downcasts a type-erased instance.
pub fn downcast<T: Any + Send + Sync>(value: AnyArc, what: &str) -> BeanResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| BeanError::TypeMismatch {
        bean: what.to_string(),
        expected: type_name::<T>(),
    })
}

/// Downcasts an instance stored as `Arc<Arc<dyn Trait>>`.
pub fn downcast_trait<T: ?Sized + Send + Sync + 'static>(value: AnyArc, what: &str) -> BeanResult<Arc<T>> {
    value
        .downcast::<Arc<T>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| BeanError::TypeMismatch {
            bean: what.to_string(),
            expected: type_name::<T>(),
        })
}
