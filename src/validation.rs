//! Startup validation of a deployed archive tree.
//!
//! Validation runs once discovery has registered every bean. It collects all
//! problems rather than stopping at the first, so a broken deployment is
//! reported in one pass. The first error becomes the container's retained
//! startup failure.
//!
//! # Checks
//!
//! - **Injection points**: every injection point of an enabled bean or
//!   observer method resolves to exactly one bean
//! - **`InjectionPoint` metadata**: only dependent beans may inject it
//! - **Names**: no two enabled beans share a name, and no name is a dotted
//!   prefix of another
//! - **Specialization**: the specialized class exists
//! - **Enablement lists**: every enabled alternative, interceptor and
//!   decorator names a matching bean class
//! - **Passivation**: beans of passivating scopes are passivation capable and
//!   so are their dependent dependencies
//! - **Observers**: conditional observers are not declared on dependent beans

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BeanKind, InjectionPoint};
use crate::config::EnabledList;
use crate::error::BeanError;
use crate::event::ObserverMethod;
use crate::key::ResolutionKey;
use crate::resolver::{BeanManager, INJECTION_POINT_TYPE};

/// Problems found while validating a deployment.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Problems that abort startup.
    pub errors: Vec<ValidationError>,
    /// Suspicious but legal configurations.
    pub warnings: Vec<ValidationWarning>,
}

/// A problem that aborts startup.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// An injection point is unsatisfied or ambiguous.
    Resolution { location: String, error: BeanError },
    /// Several enabled beans share a name.
    DuplicateName { name: String, beans: Vec<String> },
    /// A bean name is a dotted prefix of another bean name.
    NameConflict { name: String, prefix: String },
    /// A specializing bean has no valid target.
    Specialization { bean: String, reason: String },
    /// A deployment list names a class that is not a matching bean.
    UnknownEnabledClass {
        archive: String,
        list: EnabledList,
        class: String,
    },
    Passivation { bean: String, reason: String },
    /// Any other definition problem, including those raised by extensions.
    Definition(String),
}

/// A suspicious but legal configuration.
#[derive(Debug, Clone)]
pub enum ValidationWarning {
    /// An alternative that no archive enables.
    DisabledAlternative { bean: String },
}

impl ValidationError {
    /// The error raised when this problem is the startup failure.
    pub fn to_bean_error(&self) -> BeanError {
        match self {
            ValidationError::Resolution { error, .. } => error.clone(),
            other => BeanError::Definition(other.to_string()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Resolution { location, error } => {
                write!(f, "{} cannot be injected: {}", location, error)
            }
            ValidationError::DuplicateName { name, beans } => {
                write!(f, "name '{}' is used by several beans: {}", name, beans.join(", "))
            }
            ValidationError::NameConflict { name, prefix } => {
                write!(f, "bean name '{}' conflicts with bean name '{}'", name, prefix)
            }
            ValidationError::Specialization { bean, reason } => {
                write!(f, "{} cannot specialize: {}", bean, reason)
            }
            ValidationError::UnknownEnabledClass {
                archive,
                list,
                class,
            } => write!(
                f,
                "{} enabled in {} of archive '{}' is not a matching bean class",
                class, list, archive
            ),
            ValidationError::Passivation { bean, reason } => {
                write!(f, "{} is not valid for passivation: {}", bean, reason)
            }
            ValidationError::Definition(msg) => f.write_str(msg),
        }
    }
}

impl From<BeanError> for ValidationError {
    fn from(error: BeanError) -> Self {
        match error {
            BeanError::Definition(msg) => ValidationError::Definition(msg),
            other => ValidationError::Definition(other.to_string()),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::DisabledAlternative { bean } => {
                write!(f, "alternative {} is not enabled in any archive", bean)
            }
        }
    }
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// The first error, as the startup failure.
    pub fn first_error(&self) -> Option<BeanError> {
        self.errors.first().map(ValidationError::to_bean_error)
    }

    pub(crate) fn error(&mut self, error: ValidationError) {
        tracing::debug!(target: "ferrous_beans::validation", %error, "deployment problem");
        self.errors.push(error);
    }

    /// Formats errors and warnings for display.
    pub fn format_issues(&self) -> String {
        let mut output = String::new();

        if !self.errors.is_empty() {
            output.push_str("Deployment Errors:\n");
            for error in &self.errors {
                output.push_str(&format!("  - {}\n", error));
            }
        }

        if !self.warnings.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("Deployment Warnings:\n");
            for warning in &self.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
        }

        output
    }
}

/// Validates every archive of a deployment.
pub(crate) struct Validator<'a> {
    managers: &'a [Arc<BeanManager>],
    observers: &'a [Arc<ObserverMethod>],
}

impl<'a> Validator<'a> {
    pub(crate) fn new(managers: &'a [Arc<BeanManager>], observers: &'a [Arc<ObserverMethod>]) -> Self {
        Self {
            managers,
            observers,
        }
    }

    pub(crate) fn validate(&self, report: &mut ValidationReport) {
        for manager in self.managers {
            for bean in manager.registry().beans() {
                if manager.is_specialized(bean.bean_class()) {
                    continue;
                }
                if manager.deployment_priority(&bean) < 0 {
                    if bean.is_alternative() && !self.enabled_anywhere(&bean) {
                        report.warnings.push(ValidationWarning::DisabledAlternative {
                            bean: bean.display(),
                        });
                    }
                    continue;
                }
                self.check_bean(manager, &bean, report);
            }
            self.check_names(manager, report);
            self.check_enabled_lists(manager, report);
        }
        self.check_observers(report);
        tracing::debug!(
            target: "ferrous_beans::validation",
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "deployment validated"
        );
    }

    fn enabled_anywhere(&self, bean: &BeanDefinition) -> bool {
        self.managers
            .iter()
            .any(|m| m.ancestry().any(|a| a.archive() == bean.archive()) && m.deployment_priority(bean) >= 0)
    }

    fn check_bean(&self, manager: &BeanManager, bean: &Arc<BeanDefinition>, report: &mut ValidationReport) {
        if let Some(target) = bean.specializes() {
            let exists = self
                .managers
                .iter()
                .any(|m| !m.registry().by_class(target).is_empty());
            if !exists {
                report.error(ValidationError::Specialization {
                    bean: bean.display(),
                    reason: format!("no bean of class {}", target),
                });
            }
        }

        let passivating = bean.scope().is_passivating();
        if passivating && matches!(bean.kind(), BeanKind::Managed(_)) && !bean.is_passivation_capable() {
            report.error(ValidationError::Passivation {
                bean: bean.display(),
                reason: format!("scope {} requires a passivation capable bean", bean.scope()),
            });
        }

        for ip in bean.injection_points() {
            if ip.delegate {
                continue;
            }
            let location = format!("{} of {}", ip, bean.display());
            let Some(resolved) = check_point(manager, ip, &location, report) else {
                continue;
            };
            if resolved.has_type(INJECTION_POINT_TYPE) && resolved.built_in().is_some() && !bean.scope().is_dependent() {
                report.error(ValidationError::Definition(format!(
                    "{} injects InjectionPoint but has scope {}",
                    bean.display(),
                    bean.scope()
                )));
            }
            if passivating && !ip.transient && !bean.is_producer() && !passivation_safe(&resolved) {
                report.error(ValidationError::Passivation {
                    bean: bean.display(),
                    reason: format!("dependency {} is not passivation capable", resolved.display()),
                });
            }
        }
    }

    fn check_names(&self, manager: &BeanManager, report: &mut ValidationReport) {
        let mut names: BTreeMap<String, Vec<Arc<BeanDefinition>>> = BTreeMap::new();
        for bean in manager.visible_beans() {
            if manager.is_specialized(bean.bean_class()) || manager.deployment_priority(&bean) < 0 {
                continue;
            }
            if let Some(name) = bean.name() {
                names.entry(name.to_string()).or_default().push(bean);
            }
        }

        for (name, beans) in &names {
            if beans.len() > 1 {
                if let Err(BeanError::Ambiguous { candidates, .. }) = manager.resolve_named(name) {
                    let already = report.errors.iter().any(|e| {
                        matches!(e, ValidationError::DuplicateName { name: n, .. } if n == name)
                    });
                    if !already {
                        report.error(ValidationError::DuplicateName {
                            name: name.clone(),
                            beans: candidates,
                        });
                    }
                }
            }
        }

        let all: BTreeSet<&String> = names.keys().collect();
        for name in &all {
            let mut prefix = name.as_str();
            while let Some(idx) = prefix.rfind('.') {
                prefix = &prefix[..idx];
                if all.contains(&prefix.to_string()) {
                    let already = report.errors.iter().any(|e| {
                        matches!(e, ValidationError::NameConflict { name: n, .. } if n == *name)
                    });
                    if !already {
                        report.error(ValidationError::NameConflict {
                            name: (*name).clone(),
                            prefix: prefix.to_string(),
                        });
                    }
                    break;
                }
            }
        }
    }

    fn check_enabled_lists(&self, manager: &BeanManager, report: &mut ValidationReport) {
        let deployment = manager.deployment();
        let lists = [
            (EnabledList::Alternatives, deployment.alternatives()),
            (EnabledList::Interceptors, deployment.interceptors()),
            (EnabledList::Decorators, deployment.decorators()),
        ];
        for (list, classes) in lists {
            for class in classes {
                let matches = manager.ancestry().chain(self.managers.iter().map(|m| &**m)).any(|m| {
                    m.registry().by_class(class).iter().any(|b| match list {
                        EnabledList::Alternatives => b.is_alternative(),
                        EnabledList::Interceptors => b.interceptor().is_some(),
                        EnabledList::Decorators => b.decorator().is_some(),
                    })
                });
                if !matches {
                    report.error(ValidationError::UnknownEnabledClass {
                        archive: manager.archive().to_string(),
                        list,
                        class: class.to_string(),
                    });
                }
            }
        }
    }

    fn check_observers(&self, report: &mut ValidationReport) {
        for observer in self.observers {
            let Some(manager) = self.manager_of(observer) else {
                continue;
            };
            if let Some(declaring) = observer.declaring() {
                if observer.is_conditional() && declaring.scope().is_dependent() {
                    report.error(ValidationError::Definition(format!(
                        "conditional observer {} is declared on dependent bean {}",
                        observer.member(),
                        declaring.display()
                    )));
                }
            }
            for ip in observer.injection_points() {
                let location = format!("{} of observer {}", ip, observer.member());
                check_point(manager, ip, &location, report);
            }
        }
    }

    /// The declaring bean's archive, else the first (root) archive.
    fn manager_of(&self, observer: &ObserverMethod) -> Option<&'a BeanManager> {
        let archive = observer.declaring().map(|d| d.archive().clone());
        archive
            .and_then(|a| self.managers.iter().find(|m| *m.archive() == a))
            .or_else(|| self.managers.first())
            .map(|m| &**m)
    }
}

fn check_point(
    manager: &BeanManager,
    ip: &InjectionPoint,
    location: &str,
    report: &mut ValidationReport,
) -> Option<Arc<BeanDefinition>> {
    let key = ResolutionKey::new(ip.ty.clone(), &ip.qualifiers);
    match manager.resolve(&key) {
        Ok(bean) => Some(bean),
        Err(error) => {
            report.error(ValidationError::Resolution {
                location: location.to_string(),
                error: error.at(ip),
            });
            None
        }
    }
}

/// Dependencies a passivating bean may hold.
fn passivation_safe(bean: &BeanDefinition) -> bool {
    bean.scope().is_normal()
        || bean.is_passivation_capable()
        || bean.built_in().is_some()
        || bean.is_producer()
        || matches!(bean.kind(), BeanKind::Value(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanBuilder;
    use crate::scope::ScopeKind;
    use crate::types::ClassHierarchy;

    fn validate(manager: &Arc<BeanManager>) -> ValidationReport {
        let mut report = ValidationReport::default();
        Validator::new(std::slice::from_ref(manager), &[]).validate(&mut report);
        report
    }

    fn add(manager: &BeanManager, builder: BeanBuilder) {
        manager.add_bean(Arc::new(builder.build().unwrap()));
    }

    #[test]
    fn unsatisfied_points_are_collected() {
        let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
        add(
            &manager,
            BeanBuilder::new("Shop").constructor(
                vec![InjectionPoint::of("Widget").at("Shop(0)"), InjectionPoint::of("Gadget").at("Shop(1)")],
                |_| Ok(()),
            ),
        );
        let report = validate(&manager);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(
            report.first_error(),
            Some(BeanError::Unsatisfied { .. })
        ));
        assert!(report.format_issues().contains("Widget"));
    }

    #[test]
    fn duplicate_and_prefix_names() {
        let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
        add(&manager, BeanBuilder::new("A").named("cart").constructor(vec![], |_| Ok(())));
        add(&manager, BeanBuilder::new("B").named("cart").constructor(vec![], |_| Ok(())));
        add(&manager, BeanBuilder::new("C").named("cart.items").constructor(vec![], |_| Ok(())));
        let report = validate(&manager);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateName { name, beans } if name == "cart" && beans.len() == 2)));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::NameConflict { name, prefix } if name == "cart.items" && prefix == "cart")));
    }

    #[test]
    fn unknown_enabled_classes() {
        let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
        add(&manager, BeanBuilder::new("Plain").constructor(vec![], |_| Ok(())));
        manager.deployment_mut().enable_alternative("Plain");
        manager.deployment_mut().enable_interceptor("Missing").unwrap();
        let report = validate(&manager);
        let lists: Vec<EnabledList> = report
            .errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::UnknownEnabledClass { list, .. } => Some(*list),
                _ => None,
            })
            .collect();
        assert_eq!(lists, vec![EnabledList::Alternatives, EnabledList::Interceptors]);
    }

    #[test]
    fn passivating_beans_need_capable_dependencies() {
        let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
        add(&manager, BeanBuilder::new("Helper").constructor(vec![], |_| Ok(())));
        add(
            &manager,
            BeanBuilder::new("Cart")
                .scope(ScopeKind::Session)
                .passivation_capable()
                .constructor(vec![InjectionPoint::of("Helper")], |_| Ok(())),
        );
        add(
            &manager,
            BeanBuilder::new("Wishlist")
                .scope(ScopeKind::Session)
                .constructor(vec![], |_| Ok(())),
        );
        let report = validate(&manager);
        let beans: Vec<&str> = report
            .errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::Passivation { bean, .. } => Some(bean.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(beans.len(), 2);
        assert!(beans.iter().any(|b| b.contains("Cart")));
        assert!(beans.iter().any(|b| b.contains("Wishlist")));
    }

    #[test]
    fn disabled_alternatives_warn() {
        let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
        add(&manager, BeanBuilder::new("Mock").alternative().constructor(vec![], |_| Ok(())));
        let report = validate(&manager);
        assert!(report.is_valid());
        assert!(report.has_warnings());
    }
}
