//! Programmatic container configuration.

use std::sync::Arc;

use crate::bean::{BeanBuilder, ROOT_ARCHIVE};
use crate::config::{BeansConfig, EnvironmentProperties, PropertySource};
use crate::context::{ActiveContexts, InstanceStore, ScopeContext};
use crate::discovery::{ArchiveSource, DiscoveryExtension, DiscoveryPipeline, Discovered};
use crate::error::BeanResult;
use crate::event::ObserverMethod;
use crate::interception::{DefaultEnhancement, EnhancementProvider};
use crate::introspect::{StaticIntrospector, TypeIntrospector};
use crate::lifecycle::{LifecycleManager, ProxyProvider};
use crate::observer::{ContainerObserver, Observers};
use crate::scope::ScopeKind;
use crate::types::{ClassHierarchy, TypeHierarchy};

use super::Container;

/// Builder for a [`Container`]
///
/// Collects archives, programmatic beans and observers, extensions and the
/// collaborators used at runtime. [`start`](Self::start) runs discovery,
/// validation and eager startup.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder};
///
/// struct Mailer(&'static str);
///
/// let container = ContainerBuilder::new()
///     .bean(BeanBuilder::new("SmtpMailer").types(&["Mailer"]).constructor(vec![], |_| Ok(Mailer("smtp"))))
///     .bean(
///         BeanBuilder::new("MockMailer")
///             .types(&["Mailer"])
///             .alternative()
///             .constructor(vec![], |_| Ok(Mailer("mock"))),
///     )
///     .enable_alternative("MockMailer")
///     .build()
///     .unwrap();
///
/// assert_eq!(container.get::<Mailer>("Mailer", &[]).unwrap().0, "mock");
/// ```
pub struct ContainerBuilder {
    hierarchy: Arc<dyn TypeHierarchy>,
    archives: Vec<ArchiveSource>,
    introspector: Arc<dyn TypeIntrospector>,
    properties: Arc<dyn PropertySource>,
    extensions: Vec<Arc<dyn DiscoveryExtension>>,
    beans: Vec<BeanBuilder>,
    observer_methods: Vec<ObserverMethod>,
    observers: Observers,
    proxies: Option<Arc<dyn ProxyProvider>>,
    enhancement: Arc<dyn EnhancementProvider>,
    contexts: Vec<Arc<dyn ScopeContext>>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            hierarchy: Arc::new(ClassHierarchy::new()),
            archives: vec![ArchiveSource::root()],
            introspector: Arc::new(StaticIntrospector::new()),
            properties: Arc::new(EnvironmentProperties),
            extensions: Vec::new(),
            beans: Vec::new(),
            observer_methods: Vec::new(),
            observers: Observers::default(),
            proxies: None,
            enhancement: Arc::new(DefaultEnhancement),
            contexts: Vec::new(),
        }
    }

    /// Adds a bean to the archive it names (the root by default).
    pub fn bean(mut self, bean: BeanBuilder) -> Self {
        self.beans.push(bean);
        self
    }

    /// Adds an observer method not declared by any bean.
    pub fn observer_method(mut self, observer: ObserverMethod) -> Self {
        self.observer_methods.push(observer);
        self
    }

    /// Adds a diagnostics observer notified of every lookup.
    pub fn observer(mut self, observer: Arc<dyn ContainerObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    pub fn hierarchy<H: TypeHierarchy + 'static>(mut self, hierarchy: H) -> Self {
        self.hierarchy = Arc::new(hierarchy);
        self
    }

    /// Adds an archive. A source named `root` is merged into the root
    /// archive.
    pub fn archive(mut self, source: ArchiveSource) -> Self {
        if source.name() == ROOT_ARCHIVE {
            self.archives[0].merge(source);
        } else {
            self.archives.push(source);
        }
        self
    }

    /// Replaces the root archive's deployment descriptor.
    pub fn config(mut self, config: BeansConfig) -> Self {
        *self.archives[0].descriptor_mut() = config;
        self
    }

    pub fn introspector<I: TypeIntrospector + 'static>(mut self, introspector: I) -> Self {
        self.introspector = Arc::new(introspector);
        self
    }

    /// Source of the system properties consulted by exclude filters.
    pub fn properties<P: PropertySource + 'static>(mut self, properties: P) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    pub fn proxy_provider<P: ProxyProvider + 'static>(mut self, provider: P) -> Self {
        self.proxies = Some(Arc::new(provider));
        self
    }

    pub fn enhancement<E: EnhancementProvider + 'static>(mut self, enhancement: E) -> Self {
        self.enhancement = Arc::new(enhancement);
        self
    }

    pub fn extension<E: DiscoveryExtension + 'static>(mut self, extension: E) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Adds a container-wide context, for custom scopes that live as long as
    /// the container.
    pub fn scope_context(mut self, context: Arc<dyn ScopeContext>) -> Self {
        self.contexts.push(context);
        self
    }

    /// Enables an alternative class or stereotype in the root archive.
    pub fn enable_alternative(mut self, class: impl Into<String>) -> Self {
        self.archives[0]
            .descriptor_mut()
            .alternatives
            .classes
            .push(class.into());
        self
    }

    pub fn enable_interceptor(mut self, class: impl Into<String>) -> Self {
        self.archives[0].descriptor_mut().interceptors.push(class.into());
        self
    }

    pub fn enable_decorator(mut self, class: impl Into<String>) -> Self {
        self.archives[0].descriptor_mut().decorators.push(class.into());
        self
    }

    /// Runs discovery and validation and starts eager beans.
    ///
    /// Only unreadable configuration is an error here. Definition and
    /// validation problems, and failures of eager beans, are retained by the
    /// container and reported from [`Container::check`] and every lookup.
    pub fn start(self) -> BeanResult<Container> {
        let Discovered {
            root,
            managers,
            observers,
            report,
        } = DiscoveryPipeline {
            hierarchy: self.hierarchy,
            archives: self.archives,
            introspector: self.introspector,
            properties: self.properties,
            extensions: self.extensions,
            beans: self.beans,
            observers: self.observer_methods,
        }
        .run()?;

        let lifecycle = Arc::new(LifecycleManager::new(
            root,
            self.proxies,
            self.enhancement,
            self.observers,
        ));
        for manager in &managers {
            lifecycle.add_archive(manager.clone());
        }
        for observer in observers {
            lifecycle.add_observer_method(observer);
        }

        let mut contexts = ActiveContexts::new()
            .with(Arc::new(InstanceStore::new(ScopeKind::Singleton)))
            .with(Arc::new(InstanceStore::new(ScopeKind::Application)));
        for context in self.contexts {
            contexts.push(context);
        }

        let valid = report.is_valid();
        if valid {
            tracing::debug!(target: "ferrous_beans::container", warnings = report.warnings.len(), "deployment valid");
        } else {
            tracing::error!(
                target: "ferrous_beans::container",
                errors = report.errors.len(),
                "deployment invalid:\n{}",
                report.format_issues()
            );
        }

        let container = Container::new(lifecycle, managers, contexts, report);
        if valid {
            container.start_eager();
        }
        Ok(container)
    }

    /// [`start`](Self::start), failing with the retained startup failure.
    pub fn build(self) -> BeanResult<Container> {
        let container = self.start()?;
        container.check()?;
        Ok(container)
    }
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("archives", &self.archives)
            .field("beans", &self.beans.len())
            .field("observer_methods", &self.observer_methods.len())
            .field("extensions", &self.extensions.len())
            .field("proxies", &self.proxies.is_some())
            .finish()
    }
}
