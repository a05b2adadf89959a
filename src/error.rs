//! Error types for the bean container.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Bean container errors
///
/// Covers every failure the container reports: static definition problems
/// found during discovery and validation, resolution failures, and runtime
/// creation failures raised by constructors, injection or lifecycle callbacks.
///
/// Errors are `Clone` so that a startup failure can be retained and reported
/// again from every subsequent container call.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::BeanError;
///
/// let err = BeanError::Unsatisfied { requested: "Widget @Default".to_string() };
/// assert_eq!(err.to_string(), "Unsatisfied dependency: no bean matches Widget @Default");
///
/// let wrapped = BeanError::Interceptor {
///     interceptor: "TxInterceptor".to_string(),
///     source: Box::new(BeanError::message("boom")),
/// };
/// assert_eq!(wrapped.root_cause().to_string(), "boom");
/// ```
#[derive(Debug, Clone, Error)]
pub enum BeanError {
    /// Static metadata is self-contradictory (conflicting scopes, duplicate names, ...)
    #[error("Definition error: {0}")]
    Definition(String),

    /// No bean satisfies the request
    #[error("Unsatisfied dependency: no bean matches {requested}")]
    Unsatisfied { requested: String },

    /// More than one bean satisfies the request with equal precedence
    #[error(
        "Ambiguous dependency: too many beans match {requested}, because they all have equal precedence. Beans:\n  {}",
        .candidates.join("\n  ")
    )]
    Ambiguous {
        requested: String,
        candidates: Vec<String>,
    },

    /// A constructor, injection program or lifecycle callback failed
    #[error("Failed to create {bean}: {source}")]
    Creation {
        bean: String,
        source: Box<BeanError>,
    },

    /// A producer returned an unusable product
    #[error("Illegal product from {bean}: {reason}")]
    IllegalProduct { bean: String, reason: String },

    /// Creation re-entered a bean that is still under construction
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<String>),

    /// Creation nesting went deeper than the container allows
    #[error("Max creation depth {0} exceeded")]
    DepthExceeded(usize),

    /// A normal-scoped bean was requested outside of its active context
    #[error("No active context for scope {0}")]
    ContextNotActive(String),

    /// An invocation context received parameters that do not fit the signature
    #[error("Invalid parameters for {target}: {reason}")]
    InvalidParameters { target: String, reason: String },

    /// Wrapper added by the interceptor chain; see [`BeanError::root_cause`]
    #[error("Interceptor {interceptor} failed: {source}")]
    Interceptor {
        interceptor: String,
        source: Box<BeanError>,
    },

    /// A reference resolved to a null dependent product
    #[error("Null reference produced by {0}")]
    NullReference(String),

    /// A reference could not be downcast to the requested Rust type
    #[error("Type mismatch: {bean} is not a {expected}")]
    TypeMismatch { bean: String, expected: &'static str },

    /// An operation was attempted in the wrong container state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Deployment configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by application code (constructors, callbacks, producers)
    #[error("{0}")]
    Application(Arc<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl BeanError {
    /// Wraps an application error.
    pub fn application<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BeanError::Application(Arc::new(error))
    }

    /// Builds an application error from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        BeanError::Application(Arc::new(Message(msg.into())))
    }

    pub fn definition(msg: impl Into<String>) -> Self {
        BeanError::Definition(msg.into())
    }

    /// Strips interceptor wrappers down to the original cause.
    pub fn root_cause(&self) -> &BeanError {
        let mut current = self;
        while let BeanError::Interceptor { source, .. } = current {
            current = source;
        }
        current
    }

    /// Owned variant of [`root_cause`](Self::root_cause).
    pub fn into_root_cause(self) -> BeanError {
        let mut current = self;
        loop {
            match current {
                BeanError::Interceptor { source, .. } => current = *source,
                other => return other,
            }
        }
    }

    /// Wraps a failure raised while creating `bean`.
    ///
    /// Interceptor wrappers are removed first. Errors that already describe a
    /// container-level condition (resolution, definition, nested creation) are
    /// passed through untouched so a cause is wrapped exactly once.
    pub fn creation(bean: impl fmt::Display, error: BeanError) -> BeanError {
        let root = error.into_root_cause();
        if root.is_container_error() {
            root
        } else {
            BeanError::Creation {
                bean: bean.to_string(),
                source: Box::new(root),
            }
        }
    }

    /// True for errors that are produced by the container itself rather than by
    /// application code.
    pub fn is_container_error(&self) -> bool {
        matches!(
            self,
            BeanError::Definition(_)
                | BeanError::Unsatisfied { .. }
                | BeanError::Ambiguous { .. }
                | BeanError::Creation { .. }
                | BeanError::IllegalProduct { .. }
                | BeanError::Circular(_)
                | BeanError::DepthExceeded(_)
                | BeanError::ContextNotActive(_)
                | BeanError::IllegalState(_)
        )
    }

    /// True for unsatisfied or ambiguous resolution.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            BeanError::Unsatisfied { .. } | BeanError::Ambiguous { .. }
        )
    }

    /// Prefixes resolution and definition errors with the location that
    /// triggered them, e.g. the injection point being validated.
    pub fn at(self, location: impl fmt::Display) -> BeanError {
        match self {
            BeanError::Unsatisfied { requested } => BeanError::Unsatisfied {
                requested: format!("{} at {}", requested, location),
            },
            BeanError::Ambiguous {
                requested,
                candidates,
            } => BeanError::Ambiguous {
                requested: format!("{} at {}", requested, location),
                candidates,
            },
            BeanError::Definition(msg) => BeanError::Definition(format!("{}: {}", location, msg)),
            other => other,
        }
    }
}

/// Result type for container operations
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanError, BeanResult};
///
/// fn lookup() -> BeanResult<u32> {
///     Err(BeanError::ContextNotActive("request".to_string()))
/// }
///
/// assert!(lookup().is_err());
/// ```
pub type BeanResult<T> = Result<T, BeanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_wraps_application_errors_once() {
        let inner = BeanError::Interceptor {
            interceptor: "Outer".into(),
            source: Box::new(BeanError::Interceptor {
                interceptor: "Inner".into(),
                source: Box::new(BeanError::message("db down")),
            }),
        };

        let err = BeanError::creation("Repository", inner);
        match &err {
            BeanError::Creation { bean, source } => {
                assert_eq!(bean, "Repository");
                assert_eq!(source.to_string(), "db down");
            }
            other => panic!("unexpected {:?}", other),
        }

        // Wrapping a creation error again keeps the original
        let again = BeanError::creation("Service", err);
        assert!(matches!(again, BeanError::Creation { ref bean, .. } if bean == "Repository"));
    }

    #[test]
    fn resolution_errors_pass_through_creation() {
        let err = BeanError::creation(
            "Service",
            BeanError::Unsatisfied {
                requested: "Widget".into(),
            },
        );
        assert!(err.is_resolution_error());
    }

    #[test]
    fn ambiguous_display_lists_candidates() {
        let err = BeanError::Ambiguous {
            requested: "Gadget @Default".into(),
            candidates: vec!["A".into(), "B".into()],
        };
        let text = err.to_string();
        assert!(text.contains("Gadget @Default"));
        assert!(text.contains("\n  A\n  B"));
    }

    #[test]
    fn at_prefixes_location() {
        let err = BeanError::Unsatisfied {
            requested: "Widget".into(),
        }
        .at("Shop.widget");
        assert_eq!(
            err.to_string(),
            "Unsatisfied dependency: no bean matches Widget at Shop.widget"
        );
    }
}
