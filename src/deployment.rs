//! Deployment settings of an archive and the deployment-priority algorithm.
//!
//! The priority decides which of several matching beans wins:
//!
//! 1. Non-alternatives start at [`DEFAULT_PRIORITY`].
//! 2. An alternative takes its explicit priority, or else its index in the
//!    archive's alternatives list, plus one. An alternative that is neither
//!    prioritized nor listed is disabled (`-1`).
//! 3. Each stereotype with a deployment priority raises the priority to at
//!    least that value. An alternative stereotype without one disables a bean
//!    still sitting at the default priority.
//! 4. A disabled bean stays negative. Otherwise a bean declared by the
//!    resolving archive gets [`LOCAL_BONUS`] on top.

use std::sync::Arc;

use ahash::AHashMap;

use crate::bean::{BeanDefinition, BeanKind};
use crate::error::{BeanError, BeanResult};

/// Priority of an ordinary, enabled bean.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Bonus for beans declared in the archive performing the resolution.
pub const LOCAL_BONUS: i32 = 1_000_000;

/// Marker for a disabled bean.
pub const DISABLED: i32 = -1;

/// Per-archive enablement lists.
///
/// The interceptor and decorator lists are frozen once type discovery is
/// complete; later changes are rejected.
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    alternatives: Vec<Arc<str>>,
    stereotypes: AHashMap<Arc<str>, i32>,
    interceptors: Vec<Arc<str>>,
    decorators: Vec<Arc<str>>,
    frozen: bool,
}

impl Deployment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables an alternative bean class. Earlier entries have lower priority.
    pub fn enable_alternative(&mut self, bean_class: impl Into<Arc<str>>) {
        let class = bean_class.into();
        if !self.alternatives.contains(&class) {
            self.alternatives.push(class);
        }
    }

    /// Enables an alternative stereotype, ranked after those already enabled.
    pub fn enable_stereotype(&mut self, stereotype: impl Into<Arc<str>>) {
        let next = self.stereotypes.len() as i32 + DEFAULT_PRIORITY + 1;
        self.stereotypes.entry(stereotype.into()).or_insert(next);
    }

    pub fn alternatives(&self) -> &[Arc<str>] {
        &self.alternatives
    }

    pub fn alternative_index(&self, bean_class: &str) -> Option<usize> {
        self.alternatives.iter().position(|c| &**c == bean_class)
    }

    pub fn stereotype_priority(&self, stereotype: &str) -> Option<i32> {
        self.stereotypes.get(stereotype).copied()
    }

    pub fn enabled_stereotypes(&self) -> impl Iterator<Item = &Arc<str>> {
        self.stereotypes.keys()
    }

    pub fn interceptors(&self) -> &[Arc<str>] {
        &self.interceptors
    }

    pub fn decorators(&self) -> &[Arc<str>] {
        &self.decorators
    }

    pub fn enable_interceptor(&mut self, class: impl Into<Arc<str>>) -> BeanResult<()> {
        self.check_frozen("interceptor")?;
        let class = class.into();
        if self.interceptors.contains(&class) {
            return Err(BeanError::Definition(format!(
                "interceptor {} is enabled twice",
                class
            )));
        }
        self.interceptors.push(class);
        Ok(())
    }

    pub fn enable_decorator(&mut self, class: impl Into<Arc<str>>) -> BeanResult<()> {
        self.check_frozen("decorator")?;
        let class = class.into();
        if self.decorators.contains(&class) {
            return Err(BeanError::Definition(format!(
                "decorator {} is enabled twice",
                class
            )));
        }
        self.decorators.push(class);
        Ok(())
    }

    /// Replaces the ordered lists, as an extension may do at the end of type
    /// discovery.
    pub fn reorder(
        &mut self,
        alternatives: Vec<Arc<str>>,
        interceptors: Vec<Arc<str>>,
        decorators: Vec<Arc<str>>,
    ) -> BeanResult<()> {
        self.check_frozen("ordering")?;
        self.alternatives = alternatives;
        self.interceptors = interceptors;
        self.decorators = decorators;
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_frozen(&self, what: &str) -> BeanResult<()> {
        if self.frozen {
            Err(BeanError::IllegalState(format!(
                "cannot change {} after type discovery",
                what
            )))
        } else {
            Ok(())
        }
    }
}

/// What the priority algorithm needs to know about the resolving archive.
pub(crate) trait DeploymentView {
    fn archive(&self) -> &str;

    fn alternative_index(&self, bean_class: &str) -> Option<usize>;

    /// Deployment priority of a stereotype, inherited from parent archives.
    fn stereotype_priority(&self, stereotype: &str) -> Option<i32>;
}

/// Priority of the alternative itself: explicit priority or list position,
/// `-1` when disabled. Producers are enabled through their declaring class.
pub(crate) fn alternative_priority(view: &dyn DeploymentView, bean: &BeanDefinition) -> i32 {
    if let Some(p) = bean.priority() {
        return p;
    }
    let class = match bean.kind() {
        BeanKind::Producer(producer) => producer
            .declaring
            .as_ref()
            .map_or(bean.bean_class(), |d| d.bean_class()),
        _ => bean.bean_class(),
    };
    match view.alternative_index(class) {
        Some(idx) => idx as i32,
        None => DISABLED,
    }
}

/// Deployment priority of `bean` as seen from the archive behind `view`.
pub(crate) fn deployment_priority(view: &dyn DeploymentView, bean: &BeanDefinition) -> i32 {
    let mut priority = DEFAULT_PRIORITY;

    if bean.is_alternative() {
        priority = alternative_priority(view, bean);
        if priority >= 0 {
            priority += 1;
        }
    }

    for stereotype in bean.stereotypes() {
        let value = view
            .stereotype_priority(&stereotype.name)
            .or(stereotype.priority);
        match value {
            Some(v) => priority = priority.max(v),
            None if stereotype.alternative && priority == DEFAULT_PRIORITY => priority = DISABLED,
            None => {}
        }
    }

    if priority < 0 {
        return priority;
    }
    if &**bean.archive() == view.archive() || bean.built_in().is_some() {
        priority += LOCAL_BONUS;
    }
    priority
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanBuilder, Stereotype};

    struct View {
        archive: &'static str,
        deployment: Deployment,
    }

    impl DeploymentView for View {
        fn archive(&self) -> &str {
            self.archive
        }
        fn alternative_index(&self, bean_class: &str) -> Option<usize> {
            self.deployment.alternative_index(bean_class)
        }
        fn stereotype_priority(&self, stereotype: &str) -> Option<i32> {
            self.deployment.stereotype_priority(stereotype)
        }
    }

    fn view(alternatives: &[&str]) -> View {
        let mut deployment = Deployment::new();
        for a in alternatives {
            deployment.enable_alternative(*a);
        }
        View {
            archive: "root",
            deployment,
        }
    }

    fn bean(class: &str, configure: impl FnOnce(BeanBuilder) -> BeanBuilder) -> BeanDefinition {
        configure(BeanBuilder::new(class).constructor(vec![], |_| Ok(())))
            .build()
            .unwrap()
    }

    #[test]
    fn plain_local_bean() {
        let v = view(&[]);
        assert_eq!(deployment_priority(&v, &bean("A", |b| b)), LOCAL_BONUS);
        let remote = bean("A", |b| b.archive("lib"));
        assert_eq!(deployment_priority(&v, &remote), DEFAULT_PRIORITY);
    }

    #[test]
    fn list_position_plus_one() {
        let v = view(&["First", "Second"]);
        let first = bean("First", |b| b.alternative());
        let second = bean("Second", |b| b.alternative());
        let off = bean("Off", |b| b.alternative());
        assert_eq!(deployment_priority(&v, &first), LOCAL_BONUS + 1);
        assert_eq!(deployment_priority(&v, &second), LOCAL_BONUS + 2);
        assert_eq!(deployment_priority(&v, &off), DISABLED);
    }

    #[test]
    fn explicit_priority_enables_everywhere() {
        let v = view(&[]);
        let alt = bean("Alt", |b| b.alternative().priority(100).archive("lib"));
        assert_eq!(deployment_priority(&v, &alt), 101);
    }

    #[test]
    fn stereotypes_raise_or_disable() {
        let mock = Arc::new(Stereotype::new("Mock").alternative());
        let mut v = view(&[]);
        let b = bean("MockDb", |b| b.stereotype(mock.clone()));
        assert_eq!(deployment_priority(&v, &b), DISABLED);

        v.deployment.enable_stereotype("Mock");
        assert_eq!(deployment_priority(&v, &b), LOCAL_BONUS + 1);
    }

    #[test]
    fn frozen_lists_reject_changes() {
        let mut d = Deployment::new();
        d.enable_interceptor("Tx").unwrap();
        assert!(d.enable_interceptor("Tx").is_err());
        d.freeze();
        assert!(matches!(d.enable_decorator("Dec"), Err(BeanError::IllegalState(_))));
    }
}
