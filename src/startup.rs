//! Instantiation of eager beans once the deployment is valid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bean::BeanDefinition;
use crate::context::{ActiveContexts, CreationalContext};
use crate::error::BeanError;
use crate::lifecycle::LifecycleManager;
use crate::resolver::BeanManager;

/// Result of starting one eager bean.
#[derive(Debug, Clone)]
pub struct EagerStart {
    pub bean: String,
    pub duration: Duration,
    pub error: Option<BeanError>,
}

impl EagerStart {
    pub fn is_started(&self) -> bool {
        self.error.is_none()
    }
}

/// Eager beans started by the container, in start order.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub results: Vec<EagerStart>,
}

impl StartupReport {
    pub fn all_started(&self) -> bool {
        self.results.iter().all(EagerStart::is_started)
    }

    pub fn started_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_started()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EagerStart> {
        self.results.iter().filter(|r| !r.is_started())
    }

    /// The first failure, wrapped as a creation error of its bean.
    pub fn first_error(&self) -> Option<BeanError> {
        self.failures().next().and_then(|r| {
            r.error.clone().map(|e| match e {
                BeanError::Creation { .. } => e,
                other => BeanError::Creation {
                    bean: r.bean.clone(),
                    source: Box::new(other),
                },
            })
        })
    }
}

/// Eager beans enabled in the archive that declares them, in archive order
/// then registration order.
fn eager_beans(managers: &[Arc<BeanManager>]) -> Vec<Arc<BeanDefinition>> {
    managers
        .iter()
        .flat_map(|m| {
            m.registry()
                .beans()
                .into_iter()
                .filter(move |b| b.is_eager() && !m.is_specialized(b.bean_class()) && m.deployment_priority(b) >= 0)
        })
        .collect()
}

/// Creates the contextual instance of every eager bean. Every bean is
/// attempted; failures are collected in the report.
pub(crate) fn start_eager(
    lifecycle: &Arc<LifecycleManager>,
    managers: &[Arc<BeanManager>],
    cc: &CreationalContext,
    contexts: &ActiveContexts,
) -> StartupReport {
    let mut report = StartupReport::default();
    for bean in eager_beans(managers) {
        let start = Instant::now();
        let result = lifecycle.contextual(&bean, cc, contexts);
        let duration = start.elapsed();
        match &result {
            Ok(_) => {
                tracing::debug!(target: "ferrous_beans::startup", bean = %bean.display(), ?duration, "eager bean started")
            }
            Err(err) => {
                tracing::error!(target: "ferrous_beans::startup", bean = %bean.display(), error = %err, "eager bean failed")
            }
        }
        report.results.push(EagerStart {
            bean: bean.display(),
            duration,
            error: result.err(),
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wraps_once() {
        let report = StartupReport {
            results: vec![
                EagerStart {
                    bean: "Cache".into(),
                    duration: Duration::ZERO,
                    error: None,
                },
                EagerStart {
                    bean: "Pool".into(),
                    duration: Duration::ZERO,
                    error: Some(BeanError::message("no connections")),
                },
            ],
        };
        assert!(!report.all_started());
        assert_eq!(report.started_count(), 1);
        match report.first_error() {
            Some(BeanError::Creation { bean, source }) => {
                assert_eq!(bean, "Pool");
                assert_eq!(source.to_string(), "no connections");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
