//! Resolution keys for registry lookups and memoization.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::qualifier::{display_qualifiers, request_qualifiers, Qualifier, QualifierSet};
use crate::types::BaseType;

/// Key identifying one resolution request.
///
/// Requests are normalized on construction: qualifiers are de-duplicated and
/// sorted, and an empty set becomes `{@Default}`. Two keys that request the
/// same thing therefore hash identically regardless of how the qualifiers
/// were listed.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BaseType, Qualifier, ResolutionKey};
///
/// let a = ResolutionKey::new(BaseType::class("Service"), &[]);
/// let b = ResolutionKey::new(BaseType::class("Service"), &[Qualifier::default_qualifier()]);
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "Service @Default");
///
/// let fast = ResolutionKey::new(
///     BaseType::class("Service"),
///     &[Qualifier::new("Fast"), Qualifier::new("Cheap")],
/// );
/// let cheap = ResolutionKey::new(
///     BaseType::class("Service"),
///     &[Qualifier::new("Cheap"), Qualifier::new("Fast")],
/// );
/// assert_eq!(fast, cheap);
/// ```
#[derive(Debug, Clone)]
pub struct ResolutionKey {
    ty: BaseType,
    qualifiers: QualifierSet,
    /// The raw request had no qualifiers at all.
    unqualified: bool,
}

impl ResolutionKey {
    pub fn new(ty: BaseType, qualifiers: &[Qualifier]) -> Self {
        Self {
            ty,
            unqualified: qualifiers.is_empty(),
            qualifiers: request_qualifiers(qualifiers),
        }
    }

    pub fn ty(&self) -> &BaseType {
        &self.ty
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// `Object` with no explicit qualifiers: the request for every bean.
    pub fn is_universal(&self) -> bool {
        self.unqualified && self.ty.is_object()
    }
}

impl PartialEq for ResolutionKey {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.qualifiers == other.qualifiers
    }
}

impl Eq for ResolutionKey {}

impl Hash for ResolutionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.qualifiers.hash(state);
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, display_qualifiers(&self.qualifiers))
    }
}
