//! The discovery pipeline.
//!
//! Turns archive sources into registered beans in a fixed order:
//!
//! 1. create one [`BeanManager`] per archive and apply its [`BeansConfig`]
//! 2. `before_bean_discovery`
//! 3. scan: exclude filters, introspection, discovery mode and
//!    `process_annotated_type` per class
//! 4. `after_type_discovery`, then freeze every deployment
//! 5. register beans, specializing beans after the beans they replace
//! 6. register producers and observer methods
//! 7. `after_bean_discovery`
//! 8. validate, then `after_deployment_validation`
//!
//! Configuration that cannot be read aborts the pipeline. Every other
//! problem is recorded in the [`ValidationReport`].

mod extension;
mod filter;

pub use extension::{
    AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, BeforeBeanDiscovery,
    DiscoveryExtension, ProcessAnnotatedType,
};
pub use filter::{ExcludeFilter, ExcludeFilters};

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::bean::{ArchiveId, BeanBuilder, BeanDefinition, ROOT_ARCHIVE};
use crate::config::{BeansConfig, DiscoveryMode, PropertySource};
use crate::error::{BeanError, BeanResult};
use crate::event::ObserverMethod;
use crate::introspect::{Annotation, AnnotatedType, ProducerMember, TypeIntrospector};
use crate::resolver::BeanManager;
use crate::types::{BaseType, TypeHierarchy};
use crate::validation::{ValidationError, ValidationReport, Validator};

/// The classes and descriptor of one archive.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{ArchiveSource, BeansConfig, DiscoveryMode};
///
/// let web = ArchiveSource::new("web")
///     .config(BeansConfig::new().discovery(DiscoveryMode::Annotated))
///     .classes(&["com.acme.web.Controller", "com.acme.web.Session"]);
///
/// assert_eq!(web.name(), "web");
/// assert_eq!(web.parent_name(), "root");
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    name: ArchiveId,
    parent: Option<ArchiveId>,
    config: BeansConfig,
    classes: Vec<String>,
}

impl ArchiveSource {
    pub fn new(name: impl Into<ArchiveId>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            config: BeansConfig::default(),
            classes: Vec::new(),
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_ARCHIVE)
    }

    /// Archives see the beans of their parent. Defaults to the root.
    pub fn parent(mut self, parent: impl Into<ArchiveId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn config(mut self, config: BeansConfig) -> Self {
        self.config = config;
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn classes(mut self, classes: &[&str]) -> Self {
        self.classes.extend(classes.iter().map(|c| c.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> &str {
        self.parent.as_deref().unwrap_or(ROOT_ARCHIVE)
    }

    pub fn descriptor(&self) -> &BeansConfig {
        &self.config
    }

    pub(crate) fn descriptor_mut(&mut self) -> &mut BeansConfig {
        &mut self.config
    }

    /// Adds the classes and descriptor lists of `other` to this source.
    pub(crate) fn merge(&mut self, other: ArchiveSource) {
        self.classes.extend(other.classes);
        let c = other.config;
        self.config.discovery = c.discovery;
        self.config.alternatives.classes.extend(c.alternatives.classes);
        self.config.alternatives.stereotypes.extend(c.alternatives.stereotypes);
        self.config.interceptors.extend(c.interceptors);
        self.config.decorators.extend(c.decorators);
        self.config.scan.exclude.extend(c.scan.exclude);
    }
}

/// Inputs of one discovery run.
pub(crate) struct DiscoveryPipeline {
    pub(crate) hierarchy: Arc<dyn TypeHierarchy>,
    pub(crate) archives: Vec<ArchiveSource>,
    pub(crate) introspector: Arc<dyn TypeIntrospector>,
    pub(crate) properties: Arc<dyn PropertySource>,
    pub(crate) extensions: Vec<Arc<dyn DiscoveryExtension>>,
    pub(crate) beans: Vec<BeanBuilder>,
    pub(crate) observers: Vec<ObserverMethod>,
}

/// Result of a discovery run.
pub(crate) struct Discovered {
    pub(crate) root: Arc<BeanManager>,
    pub(crate) managers: Vec<Arc<BeanManager>>,
    pub(crate) observers: Vec<Arc<ObserverMethod>>,
    pub(crate) report: ValidationReport,
}

struct Scan {
    manager: Arc<BeanManager>,
    mode: DiscoveryMode,
    filters: ExcludeFilters,
    classes: Vec<String>,
}

/// A bean waiting to be registered, with the members declared on its class.
struct Pending {
    archive: ArchiveId,
    builder: BeanBuilder,
    producers: Vec<ProducerMember>,
    observers: Vec<ObserverMethod>,
}

/// Members of a class that is not itself a bean.
struct StaticMembers {
    archive: ArchiveId,
    class: Arc<str>,
    producers: Vec<ProducerMember>,
    observers: Vec<ObserverMethod>,
}

impl DiscoveryPipeline {
    pub(crate) fn run(self) -> BeanResult<Discovered> {
        let mut report = ValidationReport::default();
        let (root, managers, scans) = self.create_managers(&mut report)?;

        let mut before = BeforeBeanDiscovery::default();
        for ext in &self.extensions {
            record(&mut report, ext.as_ref(), "before_bean_discovery", ext.before_bean_discovery(&mut before));
        }

        let types = self.scan(&scans, before.added, &mut report);

        {
            let mut event = AfterTypeDiscovery::new(&managers);
            for ext in &self.extensions {
                record(&mut report, ext.as_ref(), "after_type_discovery", ext.after_type_discovery(&mut event));
            }
        }
        for manager in &managers {
            manager.deployment_mut().freeze();
        }

        let mut pending = Vec::new();
        let mut statics = Vec::new();
        for (archive, annotated) in types {
            let parts = annotated.into_parts();
            match parts.program {
                Some(program) => {
                    let mut builder = program.archive(archive.clone());
                    if !parts.types.is_empty() {
                        builder = builder.exposed_type(BaseType::class(parts.class_name.clone()));
                        for ty in parts.types {
                            builder = builder.exposed_type(ty);
                        }
                    }
                    let builder =
                        apply_annotations(builder, &parts.annotations, parts.superclass.as_ref(), &mut report);
                    pending.push(Pending {
                        archive,
                        builder,
                        producers: parts.producers,
                        observers: parts.observers,
                    });
                }
                None => statics.push(StaticMembers {
                    archive,
                    class: parts.class_name,
                    producers: parts.producers,
                    observers: parts.observers,
                }),
            }
        }
        for builder in self.beans {
            pending.push(Pending {
                archive: builder.declared_archive().clone(),
                builder,
                producers: Vec::new(),
                observers: Vec::new(),
            });
        }

        let mut observers: Vec<Arc<ObserverMethod>> = Vec::new();
        for (bean, producers, declared) in register_beans(&managers, pending, &mut report) {
            let Some(manager) = find(&managers, bean.archive()) else {
                continue;
            };
            for member in producers {
                add_producer(manager, Some(&bean), member, &mut report);
            }
            observers.extend(declared.into_iter().map(|o| Arc::new(o.declared_by(bean.clone()))));
        }
        for members in statics {
            let Some(manager) = find(&managers, &members.archive) else {
                report.error(ValidationError::Definition(format!(
                    "{} is declared in unknown archive '{}'",
                    members.class, members.archive
                )));
                continue;
            };
            for member in members.producers {
                add_producer(manager, None, member, &mut report);
            }
            observers.extend(members.observers.into_iter().map(Arc::new));
        }
        observers.extend(self.observers.into_iter().map(Arc::new));

        let mut after = AfterBeanDiscovery::default();
        for ext in &self.extensions {
            record(&mut report, ext.as_ref(), "after_bean_discovery", ext.after_bean_discovery(&mut after));
        }
        for problem in after.problems {
            report.error(ValidationError::Definition(problem));
        }
        for builder in after.beans {
            let archive = builder.declared_archive().clone();
            let Some(manager) = find(&managers, &archive) else {
                report.error(ValidationError::Definition(format!(
                    "{} is declared in unknown archive '{}'",
                    builder.bean_class(),
                    archive
                )));
                continue;
            };
            match builder.build() {
                Ok(bean) => manager.add_bean(Arc::new(bean)),
                Err(err) => report.error(err.into()),
            }
        }
        observers.extend(after.observers.into_iter().map(Arc::new));

        Validator::new(&managers, &observers).validate(&mut report);

        let mut late = Vec::new();
        for ext in &self.extensions {
            let mut event = AfterDeploymentValidation::new(&report);
            if let Err(err) = ext.after_deployment_validation(&mut event) {
                late.push(hook_error(ext.as_ref(), "after_deployment_validation", err));
            }
            late.extend(event.problems.into_iter().map(ValidationError::Definition));
        }
        for problem in late {
            report.error(problem);
        }

        tracing::debug!(
            target: "ferrous_beans::discovery",
            archives = managers.len(),
            beans = managers.iter().map(|m| m.registry().len()).sum::<usize>(),
            observers = observers.len(),
            errors = report.errors.len(),
            "discovery complete"
        );

        Ok(Discovered {
            root,
            managers,
            observers,
            report,
        })
    }

    fn create_managers(
        &self,
        report: &mut ValidationReport,
    ) -> BeanResult<(Arc<BeanManager>, Vec<Arc<BeanManager>>, Vec<Scan>)> {
        let root = BeanManager::root(self.hierarchy.clone());
        let mut managers = vec![root.clone()];
        let mut scans = Vec::new();
        let mut seen: AHashSet<&str> = AHashSet::new();

        for source in &self.archives {
            if !seen.insert(source.name()) {
                return Err(BeanError::Config(format!("archive '{}' is declared twice", source.name())));
            }
            let manager = if source.name() == ROOT_ARCHIVE {
                root.clone()
            } else {
                let parent = find(&managers, source.parent_name()).ok_or_else(|| {
                    BeanError::Config(format!(
                        "archive '{}' names unknown parent '{}'",
                        source.name(),
                        source.parent_name()
                    ))
                })?;
                let child = parent.child(source.name.clone());
                managers.push(child.clone());
                child
            };

            if let Err(err) = source.config.apply_to(&mut manager.deployment_mut()) {
                report.error(ValidationError::Definition(format!(
                    "archive '{}': {}",
                    source.name(),
                    err
                )));
            }
            scans.push(Scan {
                manager,
                mode: source.config.discovery,
                filters: ExcludeFilters::compile(&source.config.scan.exclude)?,
                classes: source.classes.clone(),
            });
            tracing::debug!(
                target: "ferrous_beans::discovery",
                archive = %source.name(),
                parent = %source.parent_name(),
                mode = ?source.config.discovery,
                classes = source.classes.len(),
                "archive created"
            );
        }
        Ok((root, managers, scans))
    }

    fn scan(
        &self,
        scans: &[Scan],
        added: Vec<(ArchiveId, AnnotatedType)>,
        report: &mut ValidationReport,
    ) -> Vec<(ArchiveId, AnnotatedType)> {
        let mut found = Vec::new();
        for scan in scans {
            let archive = scan.manager.archive();
            if scan.mode == DiscoveryMode::None {
                tracing::debug!(target: "ferrous_beans::discovery", %archive, "not a bean archive");
                continue;
            }
            for class in &scan.classes {
                if let Some(filter) = scan
                    .filters
                    .excluding(class, self.introspector.as_ref(), self.properties.as_ref())
                {
                    tracing::debug!(target: "ferrous_beans::discovery", %archive, %class, filter = %filter.name(), "excluded");
                    continue;
                }
                match self.introspector.introspect(class) {
                    Ok(Some(annotated)) => {
                        if scan.mode == DiscoveryMode::Annotated && !annotated.is_bean_defining() {
                            tracing::trace!(target: "ferrous_beans::discovery", %class, "no bean defining annotation");
                            continue;
                        }
                        found.push((archive.clone(), annotated));
                    }
                    Ok(None) => {
                        tracing::warn!(target: "ferrous_beans::discovery", %archive, %class, "class not found");
                    }
                    Err(err) => report.error(ValidationError::Definition(format!(
                        "cannot introspect {}: {}",
                        class, err
                    ))),
                }
            }
        }
        found.extend(added);

        let mut processed = Vec::with_capacity(found.len());
        for (archive, annotated) in found {
            if annotated.is_vetoed() {
                tracing::debug!(target: "ferrous_beans::discovery", class = %annotated.class_name(), "vetoed");
                continue;
            }
            let mut event = ProcessAnnotatedType::new(archive.clone(), annotated);
            for ext in &self.extensions {
                let result = ext.process_annotated_type(&mut event);
                record(report, ext.as_ref(), "process_annotated_type", result);
                if event.is_vetoed() {
                    break;
                }
            }
            let class = event.annotated_type().class_name().to_string();
            match event.into_inner() {
                Some(annotated) => processed.push((archive, annotated)),
                None => {
                    tracing::debug!(target: "ferrous_beans::discovery", %class, "vetoed by extension")
                }
            }
        }
        processed
    }
}

fn find<'a>(managers: &'a [Arc<BeanManager>], archive: &str) -> Option<&'a Arc<BeanManager>> {
    managers.iter().find(|m| &**m.archive() == archive)
}

fn hook_error(ext: &dyn DiscoveryExtension, phase: &str, err: BeanError) -> ValidationError {
    ValidationError::Definition(format!("extension {} failed in {}: {}", ext.name(), phase, err))
}

fn record(report: &mut ValidationReport, ext: &dyn DiscoveryExtension, phase: &str, result: BeanResult<()>) {
    if let Err(err) = result {
        report.error(hook_error(ext, phase, err));
    }
}

fn apply_annotations(
    mut builder: BeanBuilder,
    annotations: &[Annotation],
    superclass: Option<&Arc<str>>,
    report: &mut ValidationReport,
) -> BeanBuilder {
    let mut typed = None;
    for annotation in annotations {
        builder = match annotation {
            Annotation::Scope(scope) => builder.scope(scope.clone()),
            Annotation::Qualifier(q) => builder.qualifier(q.clone()),
            Annotation::Named(Some(name)) => builder.named(name.clone()),
            Annotation::Named(None) => builder.default_named(),
            Annotation::Stereotype(s) => builder.stereotype(s.clone()),
            Annotation::Alternative => builder.alternative(),
            Annotation::Priority(p) => builder.priority(*p),
            Annotation::Specializes => match superclass {
                Some(target) => builder.specializes(target.clone()),
                None => {
                    report.error(ValidationError::Specialization {
                        bean: builder.bean_class().to_string(),
                        reason: "the class has no superclass".to_string(),
                    });
                    builder
                }
            },
            Annotation::Vetoed => builder,
            Annotation::Eager => builder.eager(),
            Annotation::PassivationCapable => builder.passivation_capable(),
            Annotation::InterceptorBinding(b) => builder.interceptor_binding(b.clone()),
            Annotation::Typed(types) => {
                typed = Some(types.clone());
                builder
            }
        };
    }
    match typed {
        Some(types) => builder.restrict_types(types),
        None => builder,
    }
}

type Registered = (Arc<BeanDefinition>, Vec<ProducerMember>, Vec<ObserverMethod>);

/// Builds and registers `pending`. A specializing bean is built once the
/// bean it replaces is registered, so it can inherit its qualifiers and name.
fn register_beans(
    managers: &[Arc<BeanManager>],
    pending: Vec<Pending>,
    report: &mut ValidationReport,
) -> Vec<Registered> {
    let waiting_classes: AHashSet<String> = pending
        .iter()
        .map(|p| p.builder.bean_class().to_string())
        .collect();
    let mut by_class: AHashMap<String, Arc<BeanDefinition>> = AHashMap::new();
    let mut registered = Vec::with_capacity(pending.len());
    let mut queue: VecDeque<Pending> = pending.into();
    let mut deferred = 0;

    while let Some(mut next) = queue.pop_front() {
        let target = next.builder.declared_specializes();
        let mut target_bean = None;
        if let Some(target) = &target {
            target_bean = by_class.get(&**target).cloned().or_else(|| {
                managers
                    .iter()
                    .find_map(|m| m.registry().by_class(target).into_iter().next())
            });
            if target_bean.is_none() && waiting_classes.contains(&**target) {
                if deferred <= queue.len() {
                    deferred += 1;
                    queue.push_back(next);
                    continue;
                }
                report.error(ValidationError::Specialization {
                    bean: next.builder.bean_class().to_string(),
                    reason: format!("specialization of {} is cyclic", target),
                });
            }
        }
        deferred = 0;

        let Some(manager) = find(managers, &next.archive) else {
            report.error(ValidationError::Definition(format!(
                "{} is declared in unknown archive '{}'",
                next.builder.bean_class(),
                next.archive
            )));
            continue;
        };

        if let Some(replaced) = &target_bean {
            next.builder = inherit(next.builder, replaced, report);
        }

        let bean = match next.builder.build() {
            Ok(bean) => Arc::new(bean),
            Err(err) => {
                report.error(err.into());
                continue;
            }
        };

        if let Some(replaced) = &target_bean {
            for ty in replaced.types() {
                if !bean.types().contains(ty) {
                    report.error(ValidationError::Specialization {
                        bean: bean.display(),
                        reason: format!("does not expose type {} of {}", ty, replaced.bean_class()),
                    });
                }
            }
            if manager.deployment_priority(&bean) >= 0 {
                manager.mark_specialized(replaced.bean_class());
                tracing::debug!(
                    target: "ferrous_beans::discovery",
                    bean = %bean.bean_class(),
                    replaced = %replaced.bean_class(),
                    "specialized"
                );
            }
        }

        manager.add_bean(bean.clone());
        by_class.insert(bean.bean_class().to_string(), bean.clone());
        registered.push((bean, next.producers, next.observers));
    }
    registered
}

/// Gives a specializing bean the qualifiers and name of the bean it replaces.
fn inherit(mut builder: BeanBuilder, replaced: &BeanDefinition, report: &mut ValidationReport) -> BeanBuilder {
    let inherited: Vec<_> = replaced
        .qualifiers()
        .iter()
        .filter(|q| !q.is_any() && !q.is_default() && !q.is_named())
        .filter(|q| !builder.declared_qualifiers().contains(*q))
        .cloned()
        .collect();
    for q in inherited {
        builder = builder.qualifier(q);
    }
    if let Some(name) = replaced.name() {
        if builder.declared_name().is_some() {
            report.error(ValidationError::Specialization {
                bean: builder.bean_class().to_string(),
                reason: format!("both it and {} declare a name", replaced.bean_class()),
            });
        } else {
            builder = builder.named(name);
        }
    }
    builder
}

fn add_producer(
    manager: &BeanManager,
    declaring: Option<&Arc<BeanDefinition>>,
    member: ProducerMember,
    report: &mut ValidationReport,
) {
    let receiver = match (member.is_static, declaring) {
        (true, _) => None,
        (false, Some(bean)) => Some(bean.clone()),
        (false, None) => {
            report.error(ValidationError::Definition(format!(
                "producer {} is not static but its class is not a bean",
                member.member()
            )));
            return;
        }
    };
    if member.types.is_empty() {
        report.error(ValidationError::Definition(format!(
            "producer {} exposes no types",
            member.member()
        )));
        return;
    }

    let producer = match member.producer.declared_by(receiver.clone()).build() {
        Ok(producer) => producer,
        Err(err) => {
            report.error(err.into());
            return;
        }
    };
    let mut builder = BeanBuilder::new(producer.member.clone()).archive(manager.archive().clone());
    for ty in member.types {
        builder = builder.exposed_type(ty);
    }
    if let Some(declaring) = &receiver {
        if declaring.is_alternative() {
            builder = builder.alternative();
            if let Some(p) = declaring.priority() {
                builder = builder.priority(p);
            }
        }
    }
    let builder = apply_annotations(builder.producer(producer), &member.annotations, None, report);
    match builder.build() {
        Ok(bean) => {
            tracing::trace!(target: "ferrous_beans::discovery", bean = %bean.display(), "producer registered");
            manager.add_bean(Arc::new(bean));
        }
        Err(err) => report.error(err.into()),
    }
}
