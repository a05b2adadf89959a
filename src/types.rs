//! Generic-aware type model used for bean-to-injection-point matching.
//!
//! Types are identified by name rather than by Rust `TypeId`: bean metadata
//! describes the component-model types a bean exposes, which need not map
//! one-to-one onto Rust types (interfaces, generic instantiations, arrays).

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{BeanError, BeanResult};

/// Name of the universal root type.
pub const OBJECT: &str = "Object";

/// A possibly parameterized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseType {
    /// A class or interface, optionally with actual type arguments.
    Class { raw: Arc<str>, args: Vec<BaseType> },
    /// Array of the component type.
    Array(Box<BaseType>),
    /// `?`, `? extends U` or `? super L`.
    Wildcard {
        upper: Option<Box<BaseType>>,
        lower: Option<Box<BaseType>>,
    },
    /// A type variable with its declared bounds.
    Variable { name: Arc<str>, bounds: Vec<BaseType> },
}

impl BaseType {
    /// A raw (unparameterized) class type.
    pub fn class(raw: impl Into<Arc<str>>) -> Self {
        BaseType::Class {
            raw: raw.into(),
            args: Vec::new(),
        }
    }

    /// A parameterized class type.
    pub fn generic(raw: impl Into<Arc<str>>, args: Vec<BaseType>) -> Self {
        BaseType::Class {
            raw: raw.into(),
            args,
        }
    }

    pub fn object() -> Self {
        Self::class(OBJECT)
    }

    pub fn array(component: BaseType) -> Self {
        BaseType::Array(Box::new(component))
    }

    /// The unbounded wildcard `?`.
    pub fn wildcard() -> Self {
        BaseType::Wildcard {
            upper: None,
            lower: None,
        }
    }

    pub fn extends(upper: BaseType) -> Self {
        BaseType::Wildcard {
            upper: Some(Box::new(upper)),
            lower: None,
        }
    }

    pub fn super_of(lower: BaseType) -> Self {
        BaseType::Wildcard {
            upper: None,
            lower: Some(Box::new(lower)),
        }
    }

    pub fn variable(name: impl Into<Arc<str>>, bounds: Vec<BaseType>) -> Self {
        BaseType::Variable {
            name: name.into(),
            bounds,
        }
    }

    /// Parses a type expression such as `Map<String, List<? extends Number>>`
    /// or `byte[]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_beans::BaseType;
    ///
    /// let ty = BaseType::parse("List<? extends Number>").unwrap();
    /// assert_eq!(ty.raw_name(), "List");
    /// assert_eq!(ty.to_string(), "List<? extends Number>");
    /// assert!(BaseType::parse("List<").is_err());
    /// ```
    pub fn parse(text: &str) -> BeanResult<BaseType> {
        let mut parser = Parser {
            input: text.as_bytes(),
            text,
            pos: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != parser.input.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(ty)
    }

    /// The name used to bucket this type in the registry.
    pub fn raw_name(&self) -> &str {
        match self {
            BaseType::Class { raw, .. } => raw,
            BaseType::Array(_) => "[]",
            BaseType::Wildcard { .. } => "?",
            BaseType::Variable { name, .. } => name,
        }
    }

    pub fn args(&self) -> &[BaseType] {
        match self {
            BaseType::Class { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, BaseType::Class { raw, args } if &**raw == OBJECT && args.is_empty())
    }

    pub fn is_parameterized(&self) -> bool {
        !self.args().is_empty()
    }

    /// True for `?` and for `? extends Object`.
    pub fn is_unbounded(&self) -> bool {
        match self {
            BaseType::Wildcard { upper, lower } => {
                lower.is_none() && upper.as_deref().map_or(true, BaseType::is_object)
            }
            BaseType::Variable { bounds, .. } => bounds.iter().all(BaseType::is_object),
            other => other.is_object(),
        }
    }

    /// True if the type mentions a wildcard or a type variable anywhere.
    /// Such types may be requested but may not be exposed by a bean.
    pub fn is_open(&self) -> bool {
        match self {
            BaseType::Class { args, .. } => args.iter().any(BaseType::is_open),
            BaseType::Array(component) => component.is_open(),
            BaseType::Wildcard { .. } | BaseType::Variable { .. } => true,
        }
    }

    /// Replaces variables by name.
    pub fn substitute(&self, bindings: &AHashMap<Arc<str>, BaseType>) -> BaseType {
        match self {
            BaseType::Variable { name, .. } => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            BaseType::Class { raw, args } => BaseType::Class {
                raw: raw.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            BaseType::Array(c) => BaseType::Array(Box::new(c.substitute(bindings))),
            BaseType::Wildcard { upper, lower } => BaseType::Wildcard {
                upper: upper.as_ref().map(|u| Box::new(u.substitute(bindings))),
                lower: lower.as_ref().map(|l| Box::new(l.substitute(bindings))),
            },
        }
    }

    /// Bean matching: can a bean exposing `bean_type` satisfy a request for
    /// `self`?
    ///
    /// Raw names must agree. A raw request accepts every parameterization.
    /// Actual type arguments are invariant; wildcard and variable arguments
    /// are checked against their bounds through `hierarchy`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_beans::{BaseType, ClassHierarchy};
    ///
    /// let mut h = ClassHierarchy::new();
    /// h.declare("Integer", &[], &["Number"]).unwrap();
    ///
    /// let required = BaseType::parse("List<? extends Number>").unwrap();
    /// assert!(required.is_assignable_from(&BaseType::parse("List<Integer>").unwrap(), &h));
    /// assert!(!required.is_assignable_from(&BaseType::parse("List<String>").unwrap(), &h));
    ///
    /// // actual type arguments are invariant
    /// let exact = BaseType::parse("List<Number>").unwrap();
    /// assert!(!exact.is_assignable_from(&BaseType::parse("List<Integer>").unwrap(), &h));
    /// ```
    pub fn is_assignable_from(&self, bean_type: &BaseType, hierarchy: &dyn TypeHierarchy) -> bool {
        match (self, bean_type) {
            (BaseType::Variable { bounds, .. }, _) => bounds
                .iter()
                .all(|b| hierarchy.is_subtype(bean_type, b)),
            (BaseType::Array(r), BaseType::Array(b)) => r.is_assignable_from(b, hierarchy),
            (
                BaseType::Class { raw: r_raw, args: r_args },
                BaseType::Class { raw: b_raw, args: b_args },
            ) => {
                if r_raw != b_raw {
                    return false;
                }
                if r_args.is_empty() {
                    return true;
                }
                if b_args.is_empty() {
                    return r_args.iter().all(BaseType::is_unbounded);
                }
                r_args.len() == b_args.len()
                    && r_args
                        .iter()
                        .zip(b_args)
                        .all(|(r, b)| argument_matches(r, b, hierarchy))
            }
            _ => false,
        }
    }
}

fn argument_matches<H>(required: &BaseType, actual: &BaseType, h: &H) -> bool
where
    H: TypeHierarchy + ?Sized,
{
    match required {
        BaseType::Wildcard { upper, lower } => {
            let upper_ok = upper.as_deref().map_or(true, |u| match actual {
                BaseType::Variable { bounds, .. } => bounds_fit(bounds, u, h),
                _ => h.is_subtype(actual, u),
            });
            let lower_ok = lower.as_deref().map_or(true, |l| match actual {
                BaseType::Variable { bounds, .. } => bounds.iter().all(|b| h.is_subtype(l, b)),
                _ => h.is_subtype(l, actual),
            });
            upper_ok && lower_ok
        }
        BaseType::Variable { bounds: r_bounds, .. } => match actual {
            BaseType::Variable { bounds: b_bounds, .. } => b_bounds
                .iter()
                .all(|bb| r_bounds.iter().any(|rb| h.is_subtype(rb, bb)) || bb.is_object()),
            _ => r_bounds.iter().all(|rb| h.is_subtype(actual, rb)),
        },
        _ => match actual {
            BaseType::Variable { bounds, .. } => bounds.iter().all(|b| h.is_subtype(required, b)),
            _ => required == actual,
        },
    }
}

fn bounds_fit<H>(bounds: &[BaseType], upper: &BaseType, h: &H) -> bool
where
    H: TypeHierarchy + ?Sized,
{
    if bounds.is_empty() {
        return upper.is_object();
    }
    bounds.iter().any(|b| h.is_subtype(b, upper))
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Class { raw, args } => {
                write!(f, "{}", raw)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            BaseType::Array(c) => write!(f, "{}[]", c),
            BaseType::Wildcard { upper, lower } => {
                write!(f, "?")?;
                if let Some(u) = upper {
                    write!(f, " extends {}", u)?;
                }
                if let Some(l) = lower {
                    write!(f, " super {}", l)?;
                }
                Ok(())
            }
            BaseType::Variable { name, .. } => write!(f, "{}", name),
        }
    }
}

impl From<&str> for BaseType {
    /// Unparseable text becomes a raw class of that name.
    fn from(text: &str) -> Self {
        BaseType::parse(text).unwrap_or_else(|_| BaseType::class(text))
    }
}

/// Supplies the subtype relation between named types.
///
/// Only `supertypes` must be implemented; subtype checks and closures are
/// derived from it.
pub trait TypeHierarchy: Send + Sync {
    /// Direct supertypes of `ty` with type arguments substituted.
    fn supertypes(&self, ty: &BaseType) -> Vec<BaseType>;

    /// Reflexive, transitive subtype check. Everything is a subtype of
    /// `Object`.
    fn is_subtype(&self, sub: &BaseType, sup: &BaseType) -> bool {
        if sup.is_object() || sub == sup {
            return true;
        }
        match (sub, sup) {
            (BaseType::Variable { bounds, .. }, _) => bounds.iter().any(|b| self.is_subtype(b, sup)),
            (BaseType::Wildcard { upper, .. }, _) => upper
                .as_deref()
                .map_or(false, |u| self.is_subtype(u, sup)),
            (BaseType::Array(a), BaseType::Array(b)) => self.is_subtype(a, b),
            (BaseType::Class { raw: a, args: a_args }, BaseType::Class { raw: b, args: b_args })
                if a == b =>
            {
                if b_args.is_empty() {
                    return true;
                }
                if a_args.is_empty() {
                    return b_args.iter().all(BaseType::is_unbounded);
                }
                a_args.len() == b_args.len()
                    && a_args.iter().zip(b_args).all(|(x, y)| match y {
                        BaseType::Wildcard { .. } | BaseType::Variable { .. } => {
                            argument_matches(y, x, self)
                        }
                        _ => x == y,
                    })
            }
            (BaseType::Class { .. }, _) => self
                .supertypes(sub)
                .iter()
                .any(|parent| self.is_subtype(parent, sup)),
            _ => false,
        }
    }

    /// `ty` followed by every transitive supertype, ending with `Object`.
    fn closure(&self, ty: &BaseType) -> Vec<BaseType> {
        let mut out = vec![ty.clone()];
        let mut idx = 0;
        while idx < out.len() {
            for parent in self.supertypes(&out[idx]) {
                if !out.contains(&parent) {
                    out.push(parent);
                }
            }
            idx += 1;
        }
        let object = BaseType::object();
        if !out.contains(&object) {
            out.push(object);
        }
        out
    }
}

#[derive(Debug, Clone)]
struct ClassDecl {
    params: Vec<Arc<str>>,
    supertypes: Vec<BaseType>,
}

/// A table-driven [`TypeHierarchy`].
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BaseType, ClassHierarchy, TypeHierarchy};
///
/// let mut h = ClassHierarchy::new();
/// h.declare("ArrayList", &["E"], &["List<E>"]).unwrap();
/// h.declare("List", &["E"], &["Collection<E>"]).unwrap();
///
/// let list = BaseType::parse("ArrayList<String>").unwrap();
/// let closure: Vec<String> = h.closure(&list).iter().map(|t| t.to_string()).collect();
/// assert_eq!(closure, vec!["ArrayList<String>", "List<String>", "Collection<String>", "Object"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: AHashMap<Arc<str>, ClassDecl>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `raw` with its type parameter names and direct supertypes.
    /// Supertype expressions may mention the parameters.
    pub fn declare(&mut self, raw: &str, params: &[&str], supertypes: &[&str]) -> BeanResult<()> {
        let params: Vec<Arc<str>> = params.iter().map(|p| Arc::from(*p)).collect();
        let mut parsed = Vec::with_capacity(supertypes.len());
        for text in supertypes {
            let ty = BaseType::parse(text)?;
            parsed.push(bind_params(ty, &params));
        }
        self.classes.insert(
            Arc::from(raw),
            ClassDecl {
                params,
                supertypes: parsed,
            },
        );
        Ok(())
    }

    /// Builder-style [`declare`](Self::declare).
    pub fn with(mut self, raw: &str, params: &[&str], supertypes: &[&str]) -> BeanResult<Self> {
        self.declare(raw, params, supertypes)?;
        Ok(self)
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.classes.contains_key(raw)
    }

    /// Declared type parameters of `raw`, if known.
    pub fn params(&self, raw: &str) -> Option<&[Arc<str>]> {
        self.classes.get(raw).map(|d| d.params.as_slice())
    }
}

fn bind_params(ty: BaseType, params: &[Arc<str>]) -> BaseType {
    match ty {
        BaseType::Class { raw, args } if args.is_empty() && params.contains(&raw) => {
            BaseType::Variable {
                name: raw,
                bounds: Vec::new(),
            }
        }
        BaseType::Class { raw, args } => BaseType::Class {
            raw,
            args: args.into_iter().map(|a| bind_params(a, params)).collect(),
        },
        BaseType::Array(c) => BaseType::Array(Box::new(bind_params(*c, params))),
        BaseType::Wildcard { upper, lower } => BaseType::Wildcard {
            upper: upper.map(|u| Box::new(bind_params(*u, params))),
            lower: lower.map(|l| Box::new(bind_params(*l, params))),
        },
        v @ BaseType::Variable { .. } => v,
    }
}

impl TypeHierarchy for ClassHierarchy {
    fn supertypes(&self, ty: &BaseType) -> Vec<BaseType> {
        let BaseType::Class { raw, args } = ty else {
            return Vec::new();
        };
        let Some(decl) = self.classes.get(raw) else {
            return Vec::new();
        };
        if args.is_empty() || args.len() != decl.params.len() {
            // raw use erases the parameters of every supertype
            return decl.supertypes.iter().map(erase).collect();
        }
        let bindings: AHashMap<Arc<str>, BaseType> = decl
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        decl.supertypes.iter().map(|s| s.substitute(&bindings)).collect()
    }
}

fn erase(ty: &BaseType) -> BaseType {
    match ty {
        BaseType::Class { raw, .. } => BaseType::class(raw.clone()),
        other => other.clone(),
    }
}

struct Parser<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> BeanError {
        BeanError::Definition(format!(
            "cannot parse type '{}' at offset {}: {}",
            self.text, self.pos, reason
        ))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> BeanResult<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'$' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let end = self.pos + word.len();
        if self.text.get(self.pos..end) == Some(word)
            && self
                .input
                .get(end)
                .map_or(true, |c| !c.is_ascii_alphanumeric())
        {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> BeanResult<BaseType> {
        let mut ty = if self.eat(b'?') {
            if self.keyword("extends") {
                BaseType::extends(self.parse_type()?)
            } else if self.keyword("super") {
                BaseType::super_of(self.parse_type()?)
            } else {
                BaseType::wildcard()
            }
        } else {
            let raw = self.ident()?;
            let mut args = Vec::new();
            if self.eat(b'<') {
                loop {
                    args.push(self.parse_type()?);
                    if self.eat(b',') {
                        continue;
                    }
                    if self.eat(b'>') {
                        break;
                    }
                    return Err(self.error("expected ',' or '>'"));
                }
            }
            BaseType::generic(raw, args)
        };
        while self.eat(b'[') {
            if !self.eat(b']') {
                return Err(self.error("expected ']'"));
            }
            ty = BaseType::array(ty);
        }
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> ClassHierarchy {
        ClassHierarchy::new()
            .with("Integer", &[], &["Number"])
            .and_then(|h| h.with("Long", &[], &["Number"]))
            .and_then(|h| h.with("ArrayList", &["E"], &["List<E>"]))
            .unwrap()
    }

    #[test]
    fn parse_nested() {
        let ty = BaseType::parse("Map<String, List<? super Integer>>[]").unwrap();
        assert_eq!(ty.to_string(), "Map<String, List<? super Integer>>[]");
        assert!(ty.is_open());
    }

    #[test]
    fn raw_request_matches_any_parameterization() {
        let h = hierarchy();
        let raw = BaseType::class("List");
        assert!(raw.is_assignable_from(&BaseType::parse("List<String>").unwrap(), &h));
    }

    #[test]
    fn parameterized_request_and_raw_bean() {
        let h = hierarchy();
        let bean = BaseType::class("List");
        assert!(BaseType::parse("List<?>").unwrap().is_assignable_from(&bean, &h));
        assert!(!BaseType::parse("List<String>").unwrap().is_assignable_from(&bean, &h));
    }

    #[test]
    fn lower_bounded_wildcard() {
        let h = hierarchy();
        let req = BaseType::parse("List<? super Integer>").unwrap();
        assert!(req.is_assignable_from(&BaseType::parse("List<Number>").unwrap(), &h));
        assert!(req.is_assignable_from(&BaseType::parse("List<Integer>").unwrap(), &h));
        assert!(!req.is_assignable_from(&BaseType::parse("List<Long>").unwrap(), &h));
    }

    #[test]
    fn type_variable_request() {
        let h = hierarchy();
        let req = BaseType::generic(
            "List",
            vec![BaseType::variable("T", vec![BaseType::class("Number")])],
        );
        assert!(req.is_assignable_from(&BaseType::parse("List<Long>").unwrap(), &h));
        assert!(!req.is_assignable_from(&BaseType::parse("List<String>").unwrap(), &h));
    }

    #[test]
    fn subtype_through_generic_supertype() {
        let h = hierarchy();
        let sub = BaseType::parse("ArrayList<Integer>").unwrap();
        assert!(h.is_subtype(&sub, &BaseType::parse("List<Integer>").unwrap()));
        assert!(h.is_subtype(&sub, &BaseType::parse("List<? extends Number>").unwrap()));
        assert!(!h.is_subtype(&sub, &BaseType::parse("List<Number>").unwrap()));
    }
}
