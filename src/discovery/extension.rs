//! Discovery extension hooks.
//!
//! Extensions observe the discovery pipeline at five milestones and may
//! change what it registers. A hook that returns an error does not stop
//! discovery; the error is recorded as a deployment problem and startup
//! fails once validation completes.

use std::sync::Arc;

use crate::bean::{ArchiveId, BeanBuilder, ROOT_ARCHIVE};
use crate::error::{BeanError, BeanResult};
use crate::event::ObserverMethod;
use crate::introspect::AnnotatedType;
use crate::resolver::BeanManager;
use crate::validation::ValidationReport;

/// Observer of the discovery pipeline.
///
/// Every hook has an empty default.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{
///     AnnotatedType, BeanResult, ContainerBuilder, DiscoveryExtension, ProcessAnnotatedType,
/// };
///
/// struct NoLegacy;
///
/// impl DiscoveryExtension for NoLegacy {
///     fn process_annotated_type(&self, event: &mut ProcessAnnotatedType) -> BeanResult<()> {
///         if event.annotated_type().class_name().contains(".legacy.") {
///             event.veto();
///         }
///         Ok(())
///     }
/// }
///
/// let container = ContainerBuilder::new().extension(NoLegacy).build().unwrap();
/// assert!(container.validation_report().is_valid());
/// ```
pub trait DiscoveryExtension: Send + Sync {
    /// Name used when reporting problems raised by the extension.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Before any archive is scanned. Types added here are discovered like
    /// scanned ones.
    fn before_bean_discovery(&self, event: &mut BeforeBeanDiscovery) -> BeanResult<()> {
        let _ = event;
        Ok(())
    }

    /// Once per discovered type, before it becomes a bean.
    fn process_annotated_type(&self, event: &mut ProcessAnnotatedType) -> BeanResult<()> {
        let _ = event;
        Ok(())
    }

    /// After scanning. The alternative, interceptor and decorator lists are
    /// frozen once every extension has run.
    fn after_type_discovery(&self, event: &mut AfterTypeDiscovery<'_>) -> BeanResult<()> {
        let _ = event;
        Ok(())
    }

    /// After every discovered bean has been registered.
    fn after_bean_discovery(&self, event: &mut AfterBeanDiscovery) -> BeanResult<()> {
        let _ = event;
        Ok(())
    }

    /// After validation, with its report.
    fn after_deployment_validation(&self, event: &mut AfterDeploymentValidation<'_>) -> BeanResult<()> {
        let _ = event;
        Ok(())
    }
}

/// Types added before scanning.
#[derive(Debug, Default)]
pub struct BeforeBeanDiscovery {
    pub(crate) added: Vec<(ArchiveId, AnnotatedType)>,
}

impl BeforeBeanDiscovery {
    /// Adds a type to the root archive.
    pub fn add_annotated_type(&mut self, annotated: AnnotatedType) {
        self.added.push((Arc::from(ROOT_ARCHIVE), annotated));
    }

    pub fn add_annotated_type_to(&mut self, archive: &str, annotated: AnnotatedType) {
        self.added.push((Arc::from(archive), annotated));
    }
}

/// One discovered type, which the extension may replace or veto.
#[derive(Debug)]
pub struct ProcessAnnotatedType {
    archive: ArchiveId,
    annotated: AnnotatedType,
    vetoed: bool,
}

impl ProcessAnnotatedType {
    pub(crate) fn new(archive: ArchiveId, annotated: AnnotatedType) -> Self {
        Self {
            archive,
            annotated,
            vetoed: false,
        }
    }

    pub fn archive(&self) -> &str {
        &self.archive
    }

    pub fn annotated_type(&self) -> &AnnotatedType {
        &self.annotated
    }

    pub fn annotated_type_mut(&mut self) -> &mut AnnotatedType {
        &mut self.annotated
    }

    pub fn set_annotated_type(&mut self, annotated: AnnotatedType) {
        self.annotated = annotated;
    }

    /// Removes the type from discovery.
    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }

    pub(crate) fn into_inner(self) -> Option<AnnotatedType> {
        (!self.vetoed).then_some(self.annotated)
    }
}

/// Access to the deployment lists of every archive before they freeze.
pub struct AfterTypeDiscovery<'a> {
    managers: &'a [Arc<BeanManager>],
}

impl<'a> AfterTypeDiscovery<'a> {
    pub(crate) fn new(managers: &'a [Arc<BeanManager>]) -> Self {
        Self { managers }
    }

    fn manager(&self, archive: &str) -> BeanResult<&'a Arc<BeanManager>> {
        self.managers
            .iter()
            .find(|m| &**m.archive() == archive)
            .ok_or_else(|| BeanError::IllegalState(format!("unknown archive '{}'", archive)))
    }

    pub fn archives(&self) -> Vec<&str> {
        self.managers.iter().map(|m| &**m.archive()).collect()
    }

    pub fn alternatives(&self, archive: &str) -> BeanResult<Vec<Arc<str>>> {
        Ok(self.manager(archive)?.deployment().alternatives().to_vec())
    }

    pub fn interceptors(&self, archive: &str) -> BeanResult<Vec<Arc<str>>> {
        Ok(self.manager(archive)?.deployment().interceptors().to_vec())
    }

    pub fn decorators(&self, archive: &str) -> BeanResult<Vec<Arc<str>>> {
        Ok(self.manager(archive)?.deployment().decorators().to_vec())
    }

    pub fn enable_alternative(&mut self, archive: &str, class: &str) -> BeanResult<()> {
        self.manager(archive)?.deployment_mut().enable_alternative(class);
        Ok(())
    }

    pub fn enable_interceptor(&mut self, archive: &str, class: &str) -> BeanResult<()> {
        self.manager(archive)?.deployment_mut().enable_interceptor(class)
    }

    pub fn enable_decorator(&mut self, archive: &str, class: &str) -> BeanResult<()> {
        self.manager(archive)?.deployment_mut().enable_decorator(class)
    }

    /// Replaces the three lists of `archive`.
    pub fn reorder(
        &mut self,
        archive: &str,
        alternatives: Vec<Arc<str>>,
        interceptors: Vec<Arc<str>>,
        decorators: Vec<Arc<str>>,
    ) -> BeanResult<()> {
        self.manager(archive)?
            .deployment_mut()
            .reorder(alternatives, interceptors, decorators)
    }
}

/// Beans and observers added after discovery.
#[derive(Default)]
pub struct AfterBeanDiscovery {
    pub(crate) beans: Vec<BeanBuilder>,
    pub(crate) observers: Vec<ObserverMethod>,
    pub(crate) problems: Vec<String>,
}

impl AfterBeanDiscovery {
    /// Adds a synthetic bean. Interceptors and decorators can no longer be
    /// added at this point and are reported as problems.
    pub fn add_bean(&mut self, bean: BeanBuilder) {
        if bean.is_interception_bean() {
            self.problems.push(format!(
                "{} cannot be added after type discovery: interceptor and decorator lists are frozen",
                bean.bean_class()
            ));
            return;
        }
        self.beans.push(bean);
    }

    pub fn add_observer_method(&mut self, observer: ObserverMethod) {
        self.observers.push(observer);
    }

    pub fn add_definition_error(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }
}

impl std::fmt::Debug for AfterBeanDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfterBeanDiscovery")
            .field("beans", &self.beans.len())
            .field("observers", &self.observers.len())
            .field("problems", &self.problems)
            .finish()
    }
}

/// The validation result, to which extensions may add problems.
#[derive(Debug)]
pub struct AfterDeploymentValidation<'a> {
    report: &'a ValidationReport,
    pub(crate) problems: Vec<String>,
}

impl<'a> AfterDeploymentValidation<'a> {
    pub(crate) fn new(report: &'a ValidationReport) -> Self {
        Self {
            report,
            problems: Vec::new(),
        }
    }

    pub fn report(&self) -> &ValidationReport {
        self.report
    }

    pub fn add_deployment_problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }
}
