//! Invocation contexts for interceptor chains.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bean::{AnyArc, Reference};
use crate::error::{BeanError, BeanResult};
use crate::interception::{InterceptionType, InterceptorMethod};

/// Declared type of one parameter of an intercepted call.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub type_name: &'static str,
    /// `None` accepts any type.
    pub type_id: Option<TypeId>,
    pub nullable: bool,
}

impl ParamSpec {
    pub fn of<T: Any>() -> Self {
        Self {
            type_name: type_name::<T>(),
            type_id: Some(TypeId::of::<T>()),
            nullable: false,
        }
    }

    /// Accepts any non-null value.
    pub fn any() -> Self {
        Self {
            type_name: "any",
            type_id: None,
            nullable: false,
        }
    }

    /// Accepts values of the same concrete type as `value`, or null when
    /// `value` is null.
    pub fn like(value: &Reference) -> Self {
        match value {
            Some(v) => Self {
                type_name: "the injected type",
                type_id: Some((**v).type_id()),
                nullable: false,
            },
            None => Self::any().nullable(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn accepts(&self, value: &Reference) -> bool {
        match value {
            None => self.nullable,
            Some(v) => self.type_id.map_or(true, |id| (**v).type_id() == id),
        }
    }
}

/// One resolved element of an interceptor chain: an interceptor instance
/// and the callback to run on it.
#[derive(Clone)]
pub struct ChainLink {
    pub(crate) label: Arc<str>,
    pub(crate) instance: AnyArc,
    pub(crate) method: InterceptorMethod,
}

impl ChainLink {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLink").field("label", &self.label).finish()
    }
}

/// The operation at the end of a chain. Receives the current target (absent
/// while constructing) and the current parameters.
pub type Terminal<'t> = dyn FnMut(Option<&AnyArc>, Vec<Reference>) -> BeanResult<Reference> + 't;

/// State of one intercepted call, handed to each interceptor
///
/// Parameters may be replaced by interceptors; every replacement is checked
/// against the declared signature. `proceed` runs the rest of the chain and
/// finally the terminal operation. Errors coming back out of `proceed` have
/// their interceptor wrappers stripped.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{AnyArc, BeanResult, InterceptionType, InvocationContext, ParamSpec, Reference};
///
/// let specs = [ParamSpec::of::<u32>()];
/// let mut terminal = |_: Option<&AnyArc>, params: Vec<Reference>| -> BeanResult<Reference> {
///     let n = params[0].as_ref().unwrap().downcast_ref::<u32>().copied().unwrap();
///     Ok(Some(Arc::new(n * 2) as AnyArc))
/// };
/// let mut ctx = InvocationContext::new(
///     InterceptionType::AroundInvoke,
///     None,
///     Some("double"),
///     vec![Some(Arc::new(21u32) as AnyArc)],
///     &specs,
///     &[],
///     &mut terminal,
/// );
///
/// assert!(ctx.set_parameters(vec![Some(Arc::new("x") as AnyArc)]).is_err());
/// let result = ctx.proceed().unwrap().unwrap();
/// assert_eq!(result.downcast_ref::<u32>(), Some(&42));
/// ```
pub struct InvocationContext<'a> {
    interception: InterceptionType,
    target: Option<AnyArc>,
    method: Option<&'a str>,
    parameters: Vec<Reference>,
    specs: &'a [ParamSpec],
    chain: &'a [ChainLink],
    index: usize,
    terminal: &'a mut Terminal<'a>,
    data: HashMap<String, AnyArc>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(
        interception: InterceptionType,
        target: Option<AnyArc>,
        method: Option<&'a str>,
        parameters: Vec<Reference>,
        specs: &'a [ParamSpec],
        chain: &'a [ChainLink],
        terminal: &'a mut Terminal<'a>,
    ) -> Self {
        Self {
            interception,
            target,
            method,
            parameters,
            specs,
            chain,
            index: 0,
            terminal,
            data: HashMap::new(),
        }
    }

    pub fn interception(&self) -> InterceptionType {
        self.interception
    }

    /// The target instance. Absent inside `AROUND_CONSTRUCT` until
    /// `proceed` has constructed it.
    pub fn target(&self) -> Option<&AnyArc> {
        self.target.as_ref()
    }

    /// The intercepted method, for `AROUND_INVOKE`.
    pub fn method(&self) -> Option<&str> {
        self.method
    }

    pub fn parameters(&self) -> &[Reference] {
        &self.parameters
    }

    /// Typed access to parameter `index`.
    pub fn parameter<T: Any + Send + Sync>(&self, index: usize) -> BeanResult<Option<Arc<T>>> {
        match self.parameters.get(index) {
            None => Err(self.invalid(format!("no parameter at index {}", index))),
            Some(None) => Ok(None),
            Some(Some(v)) => v
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| self.invalid(format!("parameter {} is not a {}", index, type_name::<T>()))),
        }
    }

    /// Replaces all parameters. Count and types must match the signature.
    pub fn set_parameters(&mut self, parameters: Vec<Reference>) -> BeanResult<()> {
        self.check(&parameters)?;
        self.parameters = parameters;
        Ok(())
    }

    /// Replaces one parameter, checked against its declared type.
    pub fn set_parameter(&mut self, index: usize, value: Reference) -> BeanResult<()> {
        if index >= self.parameters.len() {
            return Err(self.invalid(format!(
                "index {} out of range for {} parameters",
                index,
                self.parameters.len()
            )));
        }
        if let Some(spec) = self.specs.get(index) {
            if !spec.accepts(&value) {
                return Err(self.invalid(format!("parameter {} must be {}", index, describe(spec))));
            }
        }
        self.parameters[index] = value;
        Ok(())
    }

    /// Context data shared along the chain.
    pub fn set_data(&mut self, key: impl Into<String>, value: AnyArc) {
        self.data.insert(key.into(), value);
    }

    pub fn data(&self, key: &str) -> Option<&AnyArc> {
        self.data.get(key)
    }

    /// Runs the next interceptor, or the terminal operation at the end of
    /// the chain.
    pub fn proceed(&mut self) -> BeanResult<Reference> {
        if self.index < self.chain.len() {
            let link = self.chain[self.index].clone();
            let saved = self.index;
            self.index += 1;
            let result = (link.method)(&link.instance, self);
            self.index = saved;
            result.map_err(|err| {
                let err = err.into_root_cause();
                tracing::debug!(
                    target: "ferrous_beans::interceptor",
                    interceptor = %link.label,
                    error = %err,
                    "interceptor failed"
                );
                err
            })
        } else {
            let params = self.parameters.clone();
            let result = (self.terminal)(self.target.as_ref(), params)?;
            if self.interception == InterceptionType::AroundConstruct && self.target.is_none() {
                self.target = result.clone();
            }
            Ok(result)
        }
    }

    fn check(&self, parameters: &[Reference]) -> BeanResult<()> {
        if parameters.len() != self.specs.len() {
            return Err(self.invalid(format!(
                "expected {} parameters, got {}",
                self.specs.len(),
                parameters.len()
            )));
        }
        for (i, (spec, value)) in self.specs.iter().zip(parameters).enumerate() {
            if !spec.accepts(value) {
                return Err(self.invalid(format!("parameter {} must be {}", i, describe(spec))));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> BeanError {
        BeanError::InvalidParameters {
            target: self.method.unwrap_or("<constructor>").to_string(),
            reason,
        }
    }
}

fn describe(spec: &ParamSpec) -> String {
    if spec.nullable {
        format!("{} or null", spec.type_name)
    } else {
        spec.type_name.to_string()
    }
}

impl fmt::Debug for InvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("interception", &self.interception)
            .field("method", &self.method)
            .field("parameters", &self.parameters.len())
            .field("index", &self.index)
            .field("chain", &self.chain)
            .finish()
    }
}

/// Runs `chain` around `terminal`.
pub(crate) fn run_chain(
    interception: InterceptionType,
    target: Option<AnyArc>,
    method: Option<&str>,
    parameters: Vec<Reference>,
    specs: &[ParamSpec],
    chain: &[ChainLink],
    terminal: &mut Terminal<'_>,
) -> BeanResult<(Reference, Option<AnyArc>)> {
    let mut ctx = InvocationContext::new(interception, target, method, parameters, specs, chain, terminal);
    let result = ctx.proceed()?;
    Ok((result, ctx.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn link<F>(label: &str, method: F) -> ChainLink
    where
        F: Fn(&AnyArc, &mut InvocationContext<'_>) -> BeanResult<Reference> + Send + Sync + 'static,
    {
        ChainLink {
            label: Arc::from(label),
            instance: Arc::new(()),
            method: Arc::new(method) as InterceptorMethod,
        }
    }

    #[test]
    fn chain_runs_in_order_and_can_rewrite_parameters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();
        let chain = vec![
            link("outer", move |_, ctx| {
                l1.lock().push("outer:before");
                let r = ctx.proceed();
                l1.lock().push("outer:after");
                r
            }),
            link("inner", move |_, ctx| {
                l2.lock().push("inner");
                ctx.set_parameter(0, Some(Arc::new(10u32) as AnyArc))?;
                ctx.proceed()
            }),
        ];
        let specs = [ParamSpec::of::<u32>()];
        let seen = log.clone();
        let mut terminal = move |_: Option<&AnyArc>, params: Vec<Reference>| -> BeanResult<Reference> {
            seen.lock().push("terminal");
            Ok(params[0].clone())
        };
        let (result, _) = run_chain(
            InterceptionType::AroundInvoke,
            Some(Arc::new(())),
            Some("call"),
            vec![Some(Arc::new(1u32) as AnyArc)],
            &specs,
            &chain,
            &mut terminal,
        )
        .unwrap();
        assert_eq!(result.unwrap().downcast_ref::<u32>(), Some(&10));
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner", "terminal", "outer:after"]
        );
    }

    #[test]
    fn errors_are_unwrapped_to_the_root_cause() {
        let chain = vec![
            link("outer", |_, ctx| ctx.proceed()),
            link("inner", |_, _| Err(BeanError::message("denied"))),
        ];
        let mut terminal = |_: Option<&AnyArc>, _: Vec<Reference>| -> BeanResult<Reference> { Ok(None) };
        let err = run_chain(
            InterceptionType::AroundInvoke,
            None,
            Some("call"),
            vec![],
            &[],
            &chain,
            &mut terminal,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "denied");
    }

    #[test]
    fn parameter_count_is_checked() {
        let specs = [ParamSpec::of::<u32>(), ParamSpec::any().nullable()];
        let mut terminal = |_: Option<&AnyArc>, _: Vec<Reference>| -> BeanResult<Reference> { Ok(None) };
        let mut ctx = InvocationContext::new(
            InterceptionType::AroundInvoke,
            None,
            Some("m"),
            vec![Some(Arc::new(1u32) as AnyArc), None],
            &specs,
            &[],
            &mut terminal,
        );
        assert!(ctx.set_parameters(vec![Some(Arc::new(1u32) as AnyArc)]).is_err());
        assert!(ctx.set_parameters(vec![Some(Arc::new(2u32) as AnyArc), None]).is_ok());
        assert!(ctx.set_parameter(0, None).is_err());
    }
}
