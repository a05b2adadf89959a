//! Qualifier values and the qualifier matcher.
//!
//! A qualifier is an annotation-like discriminator: a type identifier plus a
//! set of members. Members flagged non-binding take no part in equality,
//! hashing or matching. The same shape is used for interceptor bindings.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Type identifier of the built-in `@Any` qualifier.
pub const ANY: &str = "Any";
/// Type identifier of the built-in `@Default` qualifier.
pub const DEFAULT: &str = "Default";
/// Type identifier of the built-in `@Named` qualifier.
pub const NAMED: &str = "Named";

/// Inline storage for the qualifiers of one bean or one injection point.
pub type QualifierSet = SmallVec<[Qualifier; 4]>;

/// Interceptor bindings share the qualifier representation and matching rules.
pub type InterceptorBinding = Qualifier;

/// Value of a qualifier member. Arrays compare element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualifierValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<QualifierValue>),
}

impl fmt::Display for QualifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualifierValue::Bool(b) => write!(f, "{}", b),
            QualifierValue::Int(i) => write!(f, "{}", i),
            QualifierValue::Str(s) => write!(f, "\"{}\"", s),
            QualifierValue::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for QualifierValue {
    fn from(value: &str) -> Self {
        QualifierValue::Str(value.to_string())
    }
}

impl From<String> for QualifierValue {
    fn from(value: String) -> Self {
        QualifierValue::Str(value)
    }
}

impl From<i64> for QualifierValue {
    fn from(value: i64) -> Self {
        QualifierValue::Int(value)
    }
}

impl From<bool> for QualifierValue {
    fn from(value: bool) -> Self {
        QualifierValue::Bool(value)
    }
}

/// One member of a qualifier instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualifierMember {
    pub name: String,
    pub value: QualifierValue,
    /// Non-binding members are ignored by equality and matching.
    #[serde(default = "binding_default")]
    pub binding: bool,
}

fn binding_default() -> bool {
    true
}

/// A qualifier instance.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{Qualifier, QualifierMatcher};
///
/// let a = Qualifier::new("Region").with("value", "eu").with_non_binding("comment", "primary");
/// let b = Qualifier::new("Region").with("value", "eu").with_non_binding("comment", "backup");
/// let c = Qualifier::new("Region").with("value", "us");
///
/// assert!(QualifierMatcher::is_match(&a, &b));
/// assert!(!QualifierMatcher::is_match(&a, &c));
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawQualifier")]
pub struct Qualifier {
    type_name: Arc<str>,
    members: SmallVec<[QualifierMember; 2]>,
}

/// Wire form of a qualifier; members arrive in any order.
#[derive(Deserialize)]
struct RawQualifier {
    type_name: Arc<str>,
    #[serde(default)]
    members: Vec<QualifierMember>,
}

impl From<RawQualifier> for Qualifier {
    fn from(raw: RawQualifier) -> Self {
        raw.members
            .into_iter()
            .fold(Qualifier::new(raw.type_name), Qualifier::with_member)
    }
}

impl Qualifier {
    /// Creates a qualifier instance without members.
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            members: SmallVec::new(),
        }
    }

    /// The `@Any` qualifier carried by every bean.
    pub fn any() -> Self {
        Self::new(ANY)
    }

    /// The `@Default` qualifier.
    pub fn default_qualifier() -> Self {
        Self::new(DEFAULT)
    }

    /// `@Named(name)`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(NAMED).with("value", name.into())
    }

    /// Adds a binding member.
    pub fn with(self, name: impl Into<String>, value: impl Into<QualifierValue>) -> Self {
        self.with_member(QualifierMember {
            name: name.into(),
            value: value.into(),
            binding: true,
        })
    }

    /// Adds a member excluded from equality and matching.
    pub fn with_non_binding(self, name: impl Into<String>, value: impl Into<QualifierValue>) -> Self {
        self.with_member(QualifierMember {
            name: name.into(),
            value: value.into(),
            binding: false,
        })
    }

    /// Adds a member, replacing any previous member with the same name.
    /// Members are kept sorted by name.
    pub fn with_member(mut self, member: QualifierMember) -> Self {
        self.members.retain(|m| m.name != member.name);
        let pos = self
            .members
            .iter()
            .position(|m| m.name > member.name)
            .unwrap_or(self.members.len());
        self.members.insert(pos, member);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn members(&self) -> &[QualifierMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&QualifierValue> {
        self.members.iter().find(|m| m.name == name).map(|m| &m.value)
    }

    pub fn is_any(&self) -> bool {
        &*self.type_name == ANY
    }

    pub fn is_default(&self) -> bool {
        &*self.type_name == DEFAULT
    }

    pub fn is_named(&self) -> bool {
        &*self.type_name == NAMED
    }

    /// The value of a `@Named` qualifier, if this is one and it has a value.
    pub fn named_value(&self) -> Option<&str> {
        if !self.is_named() {
            return None;
        }
        match self.member("value") {
            Some(QualifierValue::Str(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    fn binding_members(&self) -> impl Iterator<Item = &QualifierMember> {
        self.members.iter().filter(|m| m.binding)
    }

    /// Type name and binding members only, e.g. `Region(value="eu")`.
    pub(crate) fn binding_key(&self) -> String {
        let members: Vec<String> = self
            .binding_members()
            .map(|m| format!("{}={}", m.name, m.value))
            .collect();
        format!("{}({})", self.type_name, members.join(","))
    }
}

impl PartialEq for Qualifier {
    fn eq(&self, other: &Self) -> bool {
        QualifierMatcher::is_match(self, other)
    }
}

impl Eq for Qualifier {}

impl Hash for Qualifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        for member in self.binding_members() {
            member.name.hash(state);
            member.value.hash(state);
        }
    }
}

impl PartialOrd for Qualifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Qualifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_name.cmp(&other.type_name).then_with(|| {
            let a = self.binding_members().map(|m| (&m.name, &m.value));
            let b = other.binding_members().map(|m| (&m.name, &m.value));
            a.cmp(b)
        })
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.type_name)?;
        if self.members.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        for (i, m) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", m.name, m.value)?;
        }
        write!(f, ")")
    }
}

/// Semantic comparison of qualifier instances.
pub struct QualifierMatcher;

impl QualifierMatcher {
    /// Two qualifiers match iff they share a type identifier and every binding
    /// member is pairwise equal.
    pub fn is_match(a: &Qualifier, b: &Qualifier) -> bool {
        if a.type_name != b.type_name {
            return false;
        }
        let mut left = a.binding_members();
        let mut right = b.binding_members();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if x.name != y.name || x.value != y.value {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// True if every required qualifier is satisfied by `bean_qualifiers`.
    ///
    /// An empty requirement means `@Default`. `@Any` is satisfied by every bean.
    pub fn matches_all(required: &[Qualifier], bean_qualifiers: &[Qualifier]) -> bool {
        if required.is_empty() {
            return bean_qualifiers.iter().any(Qualifier::is_default);
        }
        required.iter().all(|req| {
            req.is_any() || bean_qualifiers.iter().any(|q| Self::is_match(req, q))
        })
    }
}

/// Applies the implicit qualifier rules to an explicitly declared set.
///
/// Every bean carries `@Any`. A bean whose only explicit qualifier is `@Named`
/// (or that has none) also carries `@Default`.
pub fn bean_qualifiers<I>(explicit: I) -> QualifierSet
where
    I: IntoIterator<Item = Qualifier>,
{
    let mut set: QualifierSet = SmallVec::new();
    for q in explicit {
        if !set.iter().any(|existing| QualifierMatcher::is_match(existing, &q)) {
            set.push(q);
        }
    }

    let needs_default = set.iter().all(|q| q.is_named() || q.is_any());
    if needs_default && !set.iter().any(Qualifier::is_default) {
        set.push(Qualifier::default_qualifier());
    }
    if !set.iter().any(Qualifier::is_any) {
        set.push(Qualifier::any());
    }
    set.sort();
    set
}

/// Normalizes a requested qualifier set into a sorted, de-duplicated key.
/// An empty request becomes `{@Default}`.
pub fn request_qualifiers(required: &[Qualifier]) -> QualifierSet {
    let mut set: QualifierSet = SmallVec::new();
    if required.is_empty() {
        set.push(Qualifier::default_qualifier());
        return set;
    }
    for q in required {
        if !set.iter().any(|existing| QualifierMatcher::is_match(existing, q)) {
            set.push(q.clone());
        }
    }
    set.sort();
    set
}

/// Joins qualifiers for display, e.g. `@Default @Named(value="x")`.
pub fn display_qualifiers(qualifiers: &[Qualifier]) -> String {
    qualifiers
        .iter()
        .map(|q| q.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_members_compare_element_wise() {
        let a = Qualifier::new("Roles").with(
            "value",
            QualifierValue::Array(vec!["admin".into(), "user".into()]),
        );
        let b = Qualifier::new("Roles").with(
            "value",
            QualifierValue::Array(vec!["admin".into(), "user".into()]),
        );
        let c = Qualifier::new("Roles").with(
            "value",
            QualifierValue::Array(vec!["user".into(), "admin".into()]),
        );
        assert!(QualifierMatcher::is_match(&a, &b));
        assert!(!QualifierMatcher::is_match(&a, &c));
    }

    #[test]
    fn different_types_never_match() {
        assert!(!QualifierMatcher::is_match(
            &Qualifier::new("Fast"),
            &Qualifier::new("Slow")
        ));
    }

    #[test]
    fn implicit_qualifiers() {
        let set = bean_qualifiers(Vec::new());
        assert!(set.iter().any(Qualifier::is_default));
        assert!(set.iter().any(Qualifier::is_any));

        let named = bean_qualifiers(vec![Qualifier::named("cart")]);
        assert!(named.iter().any(Qualifier::is_default));
        assert_eq!(named.len(), 3);

        let explicit = bean_qualifiers(vec![Qualifier::new("Fast")]);
        assert!(!explicit.iter().any(Qualifier::is_default));
        assert!(explicit.iter().any(Qualifier::is_any));
    }

    #[test]
    fn any_matches_every_bean() {
        let bean = bean_qualifiers(vec![Qualifier::new("Fast")]);
        assert!(QualifierMatcher::matches_all(&[Qualifier::any()], &bean));
        assert!(!QualifierMatcher::matches_all(&[], &bean));
        assert!(QualifierMatcher::matches_all(&[Qualifier::new("Fast")], &bean));
    }

    #[test]
    fn members_are_sorted_and_replaced() {
        let q = Qualifier::new("Q")
            .with("b", 2i64)
            .with("a", 1i64)
            .with("b", 3i64);
        let names: Vec<_> = q.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(q.member("b"), Some(&QualifierValue::Int(3)));
    }
}
