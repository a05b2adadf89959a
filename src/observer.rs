//! Diagnostic hooks for resolution and creation.

use std::sync::Arc;
use std::time::Duration;

use crate::bean::BeanDefinition;
use crate::error::BeanError;
use crate::key::ResolutionKey;

/// Observer for container events.
///
/// Calls are made synchronously on the resolving thread, so implementations
/// should stay cheap. Every method has an empty default.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use ferrous_beans::{BeanBuilder, BeanDefinition, BeanLookup, ContainerBuilder, ContainerObserver, ResolutionKey};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ContainerObserver for Counter {
///     fn resolved(&self, _key: &ResolutionKey, _bean: &BeanDefinition, _elapsed: Duration) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let container = ContainerBuilder::new()
///     .bean(BeanBuilder::new("Config").constructor(vec![], |_| Ok(5u8)))
///     .observer(counter.clone())
///     .build()
///     .unwrap();
///
/// container.get::<u8>("Config", &[]).unwrap();
/// assert_eq!(counter.0.load(Ordering::Relaxed), 1);
/// ```
pub trait ContainerObserver: Send + Sync {
    /// A lookup for `key` is starting.
    fn resolving(&self, key: &ResolutionKey) {
        let _ = key;
    }

    /// `key` resolved to `bean` and a reference was obtained.
    fn resolved(&self, key: &ResolutionKey, bean: &BeanDefinition, elapsed: Duration) {
        let _ = (key, bean, elapsed);
    }

    /// Resolving `key` or creating its bean failed.
    fn creation_failed(&self, key: &ResolutionKey, error: &BeanError) {
        let _ = (key, error);
    }
}

/// Registered observers.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ContainerObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ContainerObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn resolving(&self, key: &ResolutionKey) {
        for o in &self.observers {
            o.resolving(key);
        }
    }

    pub(crate) fn resolved(&self, key: &ResolutionKey, bean: &BeanDefinition, elapsed: Duration) {
        for o in &self.observers {
            o.resolved(key, bean, elapsed);
        }
    }

    pub(crate) fn creation_failed(&self, key: &ResolutionKey, error: &BeanError) {
        for o in &self.observers {
            o.creation_failed(key, error);
        }
    }
}

/// Observer that reports every event through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "ferrous-beans".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerObserver for LoggingObserver {
    fn resolving(&self, key: &ResolutionKey) {
        tracing::debug!(target: "ferrous_beans::observer", prefix = %self.prefix, request = %key, "resolving");
    }

    fn resolved(&self, key: &ResolutionKey, bean: &BeanDefinition, elapsed: Duration) {
        tracing::debug!(
            target: "ferrous_beans::observer",
            prefix = %self.prefix,
            request = %key,
            bean = %bean.display(),
            elapsed_us = elapsed.as_micros() as u64,
            "resolved"
        );
    }

    fn creation_failed(&self, key: &ResolutionKey, error: &BeanError) {
        tracing::error!(target: "ferrous_beans::observer", prefix = %self.prefix, request = %key, %error, "resolution failed");
    }
}
