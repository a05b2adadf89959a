//! The container: the result of discovery, validation and eager startup.

mod builder;
mod scope_handle;

pub use builder::ContainerBuilder;
pub use scope_handle::ScopeHandle;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bean::{downcast, AnyArc, BeanDefinition, Reference};
use crate::context::{ActiveContexts, CreationalContext};
use crate::error::{BeanError, BeanResult};
use crate::instance::Instance;
use crate::internal::DisposeBag;
use crate::key::ResolutionKey;
use crate::lifecycle::LifecycleManager;
use crate::qualifier::Qualifier;
use crate::resolver::BeanManager;
use crate::scope::ScopeKind;
use crate::startup::StartupReport;
use crate::traits::BeanLookupCore;
use crate::types::BaseType;
use crate::validation::ValidationReport;

/// A started bean container
///
/// Resolves requests against the root archive unless an archive is named.
/// Dependent instances looked up directly on the container belong to the
/// container and are destroyed by [`shutdown`](Self::shutdown), or earlier
/// through [`destroy`](Self::destroy). Normal-scoped beans other than
/// `@ApplicationScoped` need a [`ScopeHandle`].
///
/// When startup validation failed, the first error is retained and returned
/// from every lookup until the container is shut down.
///
/// Cloning is cheap; clones share the same container.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder, InjectionPoint, ScopeKind};
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = ContainerBuilder::new()
///     .bean(
///         BeanBuilder::new("Database")
///             .scope(ScopeKind::Singleton)
///             .constructor(vec![], |_| Ok(Database { url: "postgres://localhost".into() })),
///     )
///     .bean(
///         BeanBuilder::new("UserService")
///             .constructor(vec![InjectionPoint::of("Database")], |args| {
///                 Ok(UserService { db: args.get::<Database>(0)? })
///             }),
///     )
///     .build()
///     .unwrap();
///
/// let users = container.get::<UserService>("UserService", &[]).unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// container.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) lifecycle: Arc<LifecycleManager>,
    pub(crate) managers: Vec<Arc<BeanManager>>,
    pub(crate) contexts: ActiveContexts,
    pub(crate) cc: CreationalContext,
    report: ValidationReport,
    startup: RwLock<StartupReport>,
    failure: RwLock<Option<BeanError>>,
    shut_down: AtomicBool,
    hooks: Mutex<DisposeBag>,
}

impl Container {
    pub(crate) fn new(
        lifecycle: Arc<LifecycleManager>,
        managers: Vec<Arc<BeanManager>>,
        contexts: ActiveContexts,
        report: ValidationReport,
    ) -> Self {
        let failure = report.first_error();
        Self {
            inner: Arc::new(ContainerInner {
                lifecycle,
                managers,
                contexts,
                cc: CreationalContext::owner(None),
                report,
                startup: RwLock::new(StartupReport::default()),
                failure: RwLock::new(failure),
                shut_down: AtomicBool::new(false),
                hooks: Mutex::new(DisposeBag::default()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &ContainerInner {
        &self.inner
    }

    /// Starts eager beans; the first failure becomes the retained failure.
    pub(crate) fn start_eager(&self) {
        let report = crate::startup::start_eager(
            &self.inner.lifecycle,
            &self.inner.managers,
            &self.inner.cc,
            &self.inner.contexts,
        );
        if let Some(err) = report.first_error() {
            self.inner.failure.write().get_or_insert(err);
        }
        *self.inner.startup.write() = report;
    }

    /// The retained startup failure, or an error once the container is shut
    /// down.
    pub fn check(&self) -> BeanResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(BeanError::IllegalState("the container has been shut down".to_string()));
        }
        match &*self.inner.failure.read() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    pub fn validation_report(&self) -> &ValidationReport {
        &self.inner.report
    }

    pub fn startup_report(&self) -> StartupReport {
        self.inner.startup.read().clone()
    }

    /// The root archive's manager.
    pub fn manager(&self) -> &Arc<BeanManager> {
        self.inner.lifecycle.root()
    }

    pub fn archive(&self, archive: &str) -> BeanResult<&Arc<BeanManager>> {
        self.inner
            .managers
            .iter()
            .find(|m| &**m.archive() == archive)
            .ok_or_else(|| BeanError::IllegalState(format!("unknown archive '{}'", archive)))
    }

    pub fn archives(&self) -> &[Arc<BeanManager>] {
        &self.inner.managers
    }

    /// Every registered bean, archive by archive.
    pub fn beans(&self) -> Vec<Arc<BeanDefinition>> {
        self.inner
            .managers
            .iter()
            .flat_map(|m| m.registry().beans())
            .collect()
    }

    /// Resolves `ty` in the root archive without creating anything.
    pub fn resolve(&self, ty: &str, qualifiers: &[Qualifier]) -> BeanResult<Arc<BeanDefinition>> {
        self.check()?;
        self.manager()
            .resolve(&ResolutionKey::new(BaseType::from(ty), qualifiers))
    }

    pub fn resolve_in(
        &self,
        archive: &str,
        ty: &str,
        qualifiers: &[Qualifier],
    ) -> BeanResult<Arc<BeanDefinition>> {
        self.check()?;
        self.archive(archive)?
            .resolve(&ResolutionKey::new(BaseType::from(ty), qualifiers))
    }

    /// A reference resolved from `archive`, so that its local beans and
    /// alternatives apply.
    pub fn reference_in(&self, archive: &str, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference> {
        self.check()?;
        let manager = self.archive(archive)?;
        let key = ResolutionKey::new(ty.clone(), qualifiers);
        self.inner
            .lifecycle
            .lookup(manager, &key, &self.inner.cc, &self.inner.contexts)
    }

    pub fn get_in<T: Any + Send + Sync>(
        &self,
        archive: &str,
        ty: &str,
        qualifiers: &[Qualifier],
    ) -> BeanResult<Arc<T>> {
        let value = self
            .reference_in(archive, &BaseType::from(ty), qualifiers)?
            .ok_or_else(|| BeanError::NullReference(ty.to_string()))?;
        downcast::<T>(value, ty)
    }

    /// A programmatic lookup handle for `ty`.
    pub fn instance(&self, ty: &str, qualifiers: &[Qualifier]) -> BeanResult<Instance> {
        self.check()?;
        Ok(Instance::new(
            Arc::downgrade(&self.inner.lifecycle),
            self.manager().clone(),
            BaseType::from(ty),
            qualifiers.to_vec(),
            self.inner.cc.clone(),
            self.inner.contexts.clone(),
        ))
    }

    /// Fires `payload` as an event of `event_type` to the matching observer
    /// methods. Returns the number of observers notified.
    pub fn fire<T: Any + Send + Sync>(
        &self,
        event_type: &str,
        qualifiers: &[Qualifier],
        payload: T,
    ) -> BeanResult<usize> {
        self.check()?;
        let payload: AnyArc = Arc::new(payload);
        self.inner.lifecycle.fire(
            &BaseType::from(event_type),
            qualifiers,
            &payload,
            &self.inner.contexts,
        )
    }

    /// Enters a new context of a normal scope such as `Request` or
    /// `Session`.
    pub fn enter_scope(&self, scope: ScopeKind) -> BeanResult<ScopeHandle> {
        self.check()?;
        ScopeHandle::enter(self.clone(), &self.inner.contexts, scope)
    }

    /// Destroys a dependent instance obtained from this container, together
    /// with its own dependents.
    pub fn destroy(&self, instance: &AnyArc) -> BeanResult<()> {
        match self.inner.cc.find_descendant(instance) {
            Some(entry) => entry.release(),
            None => Err(BeanError::IllegalState(
                "instance is not a dependent obtained from this container".to_string(),
            )),
        }
    }

    /// Registers a hook run by [`shutdown`](Self::shutdown) after every
    /// contextual instance was destroyed. Hooks run in reverse registration
    /// order.
    pub fn on_shutdown<F>(&self, label: impl Into<String>, hook: F)
    where
        F: FnOnce() -> BeanResult<()> + Send + 'static,
    {
        self.inner.hooks.lock().push(label, Box::new(hook));
    }

    /// Destroys the container's dependents, then the application and
    /// singleton contexts, then runs the shutdown hooks. Every step is
    /// attempted; the first failure is returned. Calling it again does
    /// nothing.
    pub fn shutdown(&self) -> BeanResult<()> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(target: "ferrous_beans::container", "shutting down");

        let mut first_error = None;
        if let Err(err) = self.inner.cc.release() {
            first_error.get_or_insert(err);
        }
        let contexts: Vec<_> = self.inner.contexts.iter().cloned().collect();
        for context in contexts.into_iter().rev() {
            if let Err(err) = context.destroy_all() {
                tracing::warn!(target: "ferrous_beans::container", scope = %context.scope(), error = %err, "destroying context failed");
                first_error.get_or_insert(err);
            }
        }
        let mut hooks = std::mem::take(&mut *self.inner.hooks.lock());
        if let Err(err) = hooks.run_all_reverse() {
            first_error.get_or_insert(err);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Multi-line description of archives, beans and enabled lists.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "Container {{");
        for manager in &self.inner.managers {
            let _ = writeln!(
                out,
                "  archive {} (parent: {})",
                manager.archive(),
                manager.parent().map_or("-", |p| &**p.archive())
            );
            {
                let deployment = manager.deployment();
                let lists = [
                    ("alternatives", deployment.alternatives()),
                    ("interceptors", deployment.interceptors()),
                    ("decorators", deployment.decorators()),
                ];
                for (label, list) in lists {
                    if !list.is_empty() {
                        let names: Vec<&str> = list.iter().map(|c| &**c).collect();
                        let _ = writeln!(out, "    {}: [{}]", label, names.join(", "));
                    }
                }
            }
            let mut beans = manager.registry().beans();
            beans.sort_by_key(|b| b.display());
            for bean in beans {
                let priority = manager.deployment_priority(&bean);
                let state = if manager.is_specialized(bean.bean_class()) {
                    "specialized".to_string()
                } else if priority < 0 {
                    "disabled".to_string()
                } else {
                    format!("priority {}", priority)
                };
                let _ = writeln!(out, "    {} [{}] ({})", bean.display(), bean.scope(), state);
            }
        }
        let _ = writeln!(
            out,
            "  validation: {} error(s), {} warning(s)",
            self.inner.report.errors.len(),
            self.inner.report.warnings.len()
        );
        let _ = write!(out, "}}");
        out
    }
}

impl BeanLookupCore for Container {
    fn reference_any(&self, ty: &BaseType, qualifiers: &[Qualifier]) -> BeanResult<Reference> {
        self.check()?;
        let key = ResolutionKey::new(ty.clone(), qualifiers);
        self.inner
            .lifecycle
            .lookup(self.manager(), &key, &self.inner.cc, &self.inner.contexts)
    }

    fn reference_named(&self, name: &str) -> BeanResult<Reference> {
        self.check()?;
        let bean = self.manager().resolve_named(name)?;
        self.inner
            .lifecycle
            .reference(&bean, None, &self.inner.cc, None, &self.inner.contexts)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::Acquire) && self.cc.len() > 1 {
            tracing::warn!(
                target: "ferrous_beans::container",
                dependents = self.cc.len() - 1,
                "container dropped without shutdown; dependents were not destroyed"
            );
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("archives", &self.inner.managers.len())
            .field("beans", &self.inner.managers.iter().map(|m| m.registry().len()).sum::<usize>())
            .field("contexts", &self.inner.contexts)
            .field("failed", &self.inner.failure.read().is_some())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
