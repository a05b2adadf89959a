//! Lookup traits for obtaining contextual references.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::bean::{downcast, downcast_trait, Reference};
use crate::error::{BeanError, BeanResult};
use crate::qualifier::Qualifier;
use crate::types::BaseType;

/// Object-safe core of bean lookup.
///
/// Implemented by [`Container`](crate::Container), [`ScopeHandle`](crate::ScopeHandle)
/// and the lookup handed to synthetic beans. Dependent references obtained
/// through a lookup belong to the lookup's creational context.
pub trait BeanLookupCore: Send + Sync {
    /// Resolves `ty` with `qualifiers` and returns a contextual reference.
    ///
    /// `Ok(None)` is a null product of a dependent producer.
    fn reference_any(&self, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference>;

    /// Resolves a bean by its `@Named` name.
    fn reference_named(&self, name: &str) -> BeanResult<Reference>;
}

/// Typed lookups on top of [`BeanLookupCore`].
///
/// Concrete beans are downcast to `T`. Beans exposing a trait object store
/// an `Arc<dyn Trait>` inside the erased reference and are read back with
/// [`get_trait`](Self::get_trait).
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder, ScopeKind};
///
/// struct Clock { tick: u64 }
///
/// let container = ContainerBuilder::new()
///     .bean(BeanBuilder::new("Clock").scope(ScopeKind::Singleton).constructor(vec![], |_| Ok(Clock { tick: 7 })))
///     .build()
///     .unwrap();
///
/// let clock = container.get::<Clock>("Clock", &[]).unwrap();
/// assert_eq!(clock.tick, 7);
/// ```
pub trait BeanLookup: BeanLookupCore {
    /// Resolves `ty` and downcasts the reference to `T`.
    fn get<T: Any + Send + Sync>(&self, ty: &str, qualifiers: &[Qualifier]) -> BeanResult<Arc<T>> {
        let reference = self.reference_any(&BaseType::from(ty), qualifiers)?;
        let value = reference.ok_or_else(|| BeanError::NullReference(ty.to_string()))?;
        downcast::<T>(value, ty)
    }

    /// Like [`get`](Self::get) but a null product is `Ok(None)`.
    fn get_optional<T: Any + Send + Sync>(
        &self,
        ty: &str,
        qualifiers: &[Qualifier],
    ) -> BeanResult<Option<Arc<T>>> {
        match self.reference_any(&BaseType::from(ty), qualifiers)? {
            Some(value) => downcast::<T>(value, ty).map(Some),
            None => Ok(None),
        }
    }

    /// Resolves a trait-object bean stored as `Arc<Arc<T>>`.
    fn get_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        ty: &str,
        qualifiers: &[Qualifier],
    ) -> BeanResult<Arc<T>> {
        let reference = self.reference_any(&BaseType::from(ty), qualifiers)?;
        let value = reference.ok_or_else(|| BeanError::NullReference(ty.to_string()))?;
        downcast_trait::<T>(value, ty)
    }

    /// Resolves a bean by name and downcasts it to `T`.
    fn get_named<T: Any + Send + Sync>(&self, name: &str) -> BeanResult<Arc<T>> {
        let value = self
            .reference_named(name)?
            .ok_or_else(|| BeanError::NullReference(name.to_string()))?;
        value.downcast::<T>().map_err(|_| BeanError::TypeMismatch {
            bean: name.to_string(),
            expected: type_name::<T>(),
        })
    }
}

impl<L: BeanLookupCore + ?Sized> BeanLookup for L {}
