//! Bean resolution within an archive tree.
//!
//! Each archive has a [`BeanManager`] holding its own registry and
//! deployment settings. A manager sees the beans of its ancestors, never
//! those of its children. Priorities are always computed by the manager that
//! performs the resolution, so only its own beans receive the local bonus.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bean::{ArchiveId, BeanBuilder, BeanDefinition, BuiltIn};
use crate::deployment::{self, Deployment, DeploymentView};
use crate::error::{BeanError, BeanResult};
use crate::key::ResolutionKey;
use crate::qualifier::Qualifier;
use crate::registry::BeanRegistry;
use crate::types::{BaseType, TypeHierarchy};

/// Raw type name of the programmatic lookup handle.
pub const INSTANCE_TYPE: &str = "Instance";
/// Raw type name of the event handle.
pub const EVENT_TYPE: &str = "Event";
/// Raw type name of injection point metadata.
pub const INJECTION_POINT_TYPE: &str = "InjectionPoint";

/// Class names replaced by a specializing bean, shared by the whole tree.
pub(crate) type SpecializedSet = Arc<RwLock<AHashSet<Arc<str>>>>;

/// Resolver and registry for one archive
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BaseType, BeanBuilder, BeanManager, BeanError, ClassHierarchy, ResolutionKey};
///
/// let manager = BeanManager::root(Arc::new(ClassHierarchy::new()));
/// let plain = |class: &str| {
///     Arc::new(BeanBuilder::new(class).types(&["Service"]).constructor(vec![], |_| Ok(())).build().unwrap())
/// };
/// manager.add_bean(plain("Foo"));
///
/// let alt = Arc::new(
///     BeanBuilder::new("FooAlt").types(&["Service"]).alternative()
///         .constructor(vec![], |_| Ok(())).build().unwrap(),
/// );
/// manager.add_bean(alt);
///
/// let key = ResolutionKey::new(BaseType::class("Service"), &[]);
/// // the alternative is not enabled yet
/// assert_eq!(manager.resolve(&key).unwrap().bean_class(), "Foo");
///
/// manager.deployment_mut().enable_alternative("FooAlt");
/// assert_eq!(manager.resolve(&key).unwrap().bean_class(), "FooAlt");
///
/// manager.add_bean(plain("Bar"));
/// manager.deployment_mut().reorder(vec![], vec![], vec![]).unwrap();
/// assert!(matches!(manager.resolve(&key), Err(BeanError::Ambiguous { .. })));
/// ```
pub struct BeanManager {
    archive: ArchiveId,
    parent: Option<Arc<BeanManager>>,
    registry: BeanRegistry,
    deployment: RwLock<Deployment>,
    specialized: SpecializedSet,
    built_ins: RwLock<AHashMap<ResolutionKey, Arc<BeanDefinition>>>,
}

impl BeanManager {
    /// Creates the manager of the root archive.
    pub fn root(hierarchy: Arc<dyn TypeHierarchy>) -> Arc<Self> {
        Arc::new(Self {
            archive: Arc::from(crate::bean::ROOT_ARCHIVE),
            parent: None,
            registry: BeanRegistry::new(hierarchy),
            deployment: RwLock::new(Deployment::new()),
            specialized: Arc::new(RwLock::new(AHashSet::new())),
            built_ins: RwLock::new(AHashMap::new()),
        })
    }

    /// Creates a child archive that sees this manager's beans.
    pub fn child(self: &Arc<Self>, archive: impl Into<ArchiveId>) -> Arc<Self> {
        Arc::new(Self {
            archive: archive.into(),
            parent: Some(self.clone()),
            registry: BeanRegistry::new(self.registry.hierarchy().clone()),
            deployment: RwLock::new(Deployment::new()),
            specialized: self.specialized.clone(),
            built_ins: RwLock::new(AHashMap::new()),
        })
    }

    pub fn archive(&self) -> &ArchiveId {
        &self.archive
    }

    pub fn parent(&self) -> Option<&Arc<BeanManager>> {
        self.parent.as_ref()
    }

    pub fn registry(&self) -> &BeanRegistry {
        &self.registry
    }

    pub fn hierarchy(&self) -> &Arc<dyn TypeHierarchy> {
        self.registry.hierarchy()
    }

    pub fn deployment(&self) -> RwLockReadGuard<'_, Deployment> {
        self.deployment.read()
    }

    pub fn deployment_mut(&self) -> RwLockWriteGuard<'_, Deployment> {
        self.deployment.write()
    }

    /// Adds a bean to this archive's registry.
    pub fn add_bean(&self, bean: Arc<BeanDefinition>) {
        self.registry.index(bean);
    }

    /// Removes `bean_class` from resolution everywhere in the tree.
    pub(crate) fn mark_specialized(&self, bean_class: impl Into<Arc<str>>) {
        self.specialized.write().insert(bean_class.into());
    }

    pub fn is_specialized(&self, bean_class: &str) -> bool {
        self.specialized.read().contains(bean_class)
    }

    /// This manager followed by its ancestors.
    pub fn ancestry(&self) -> impl Iterator<Item = &BeanManager> {
        std::iter::successors(Some(self), |m| m.parent.as_deref())
    }

    /// Every bean visible from this archive: its own and its ancestors'.
    pub fn visible_beans(&self) -> Vec<Arc<BeanDefinition>> {
        self.ancestry().flat_map(|m| m.registry.beans()).collect()
    }

    /// Deployment priority of `bean` as seen from this archive; negative when
    /// the bean is disabled here.
    pub fn deployment_priority(&self, bean: &BeanDefinition) -> i32 {
        deployment::deployment_priority(self, bean)
    }

    /// Priority of `bean` as seen by the archive that declared it.
    fn declared_priority(&self, bean: &BeanDefinition) -> i32 {
        self.ancestry()
            .find(|m| m.archive == *bean.archive())
            .map_or(deployment::DISABLED, |m| m.deployment_priority(bean))
    }

    /// Priority used to rank `bean` during selection. An alternative disabled
    /// here keeps the rank its declaring archive gives it, which only matters
    /// when [`lookup`](Self::lookup) fell back to such alternatives.
    fn ranking_priority(&self, bean: &BeanDefinition) -> i32 {
        let priority = self.deployment_priority(bean);
        if priority >= 0 || !bean.is_alternative() {
            return priority;
        }
        self.declared_priority(bean)
    }

    /// Matching beans visible from this archive with disabled alternatives
    /// removed. Interceptors and decorators are only returned for the
    /// universal request.
    ///
    /// A disabled alternative is kept only when nothing else matches and the
    /// archive that declared it has enabled it.
    pub fn lookup(&self, key: &ResolutionKey) -> Vec<Arc<BeanDefinition>> {
        let universal = key.is_universal();
        let mut all: Vec<Arc<BeanDefinition>> = Vec::new();
        for manager in self.ancestry() {
            for bean in manager.registry.lookup(key).iter() {
                if self.is_specialized(bean.bean_class()) {
                    continue;
                }
                // interceptors and decorators are not injectable
                if !universal && (bean.interceptor().is_some() || bean.decorator().is_some()) {
                    continue;
                }
                all.push(bean.clone());
            }
        }

        let (enabled, disabled): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|b| self.deployment_priority(b) >= 0);

        if !enabled.is_empty() {
            return enabled;
        }
        disabled
            .into_iter()
            .filter(|b| b.is_alternative() && self.declared_priority(b) >= 0)
            .collect()
    }

    /// Resolves `key` to exactly one bean.
    ///
    /// `Instance<T>`, `Event<T>` and `InjectionPoint` requests are answered
    /// with container-provided beans.
    pub fn resolve(&self, key: &ResolutionKey) -> BeanResult<Arc<BeanDefinition>> {
        if let Some(built_in) = self.built_in(key)? {
            return Ok(built_in);
        }

        let candidates = self.lookup(key);
        if candidates.is_empty() {
            if let Some(parent) = &self.parent {
                return parent.resolve(key);
            }
            tracing::debug!(target: "ferrous_beans::resolve", archive = %self.archive, request = %key, "unsatisfied");
            return Err(BeanError::Unsatisfied {
                requested: key.to_string(),
            });
        }

        self.select(key, &candidates)
    }

    /// Picks the single best bean out of `candidates`, which come from
    /// [`lookup`](Self::lookup) and are already free of specialized beans.
    pub fn select(
        &self,
        key: &ResolutionKey,
        candidates: &[Arc<BeanDefinition>],
    ) -> BeanResult<Arc<BeanDefinition>> {
        let mut best: Option<&Arc<BeanDefinition>> = None;
        let mut second: Option<&Arc<BeanDefinition>> = None;
        let mut best_priority = -1;
        let mut specializes = false;

        for bean in candidates {
            if bean.specializes().is_some() {
                if !specializes {
                    best_priority = -1;
                    best = None;
                    second = None;
                    specializes = true;
                }
            } else if specializes {
                continue;
            }

            let priority = self.ranking_priority(bean);

            if priority < 0 {
                continue;
            } else if best_priority < priority {
                best = Some(bean);
                second = None;
                best_priority = priority;
            } else if best_priority == priority {
                second = Some(bean);

                let first_produces = best.map_or(false, |b| b.is_producer());
                let second_produces = bean.is_producer();
                if first_produces && !second_produces {
                    second = None;
                } else if second_produces && !first_produces {
                    best = Some(bean);
                    second = None;
                }
            }
        }

        match (best, second) {
            (Some(bean), None) => Ok(bean.clone()),
            (None, _) => Err(BeanError::Unsatisfied {
                requested: key.to_string(),
            }),
            (Some(_), Some(_)) => {
                let mut tied: Vec<String> = candidates
                    .iter()
                    .filter(|b| !specializes || b.specializes().is_some())
                    .filter(|b| self.ranking_priority(b) == best_priority)
                    .map(|b| b.display())
                    .collect();
                tied.sort();
                tracing::debug!(target: "ferrous_beans::resolve", archive = %self.archive, request = %key, count = tied.len(), "ambiguous");
                Err(BeanError::Ambiguous {
                    requested: key.to_string(),
                    candidates: tied,
                })
            }
        }
    }

    /// Resolves a bean by its `@Named` name.
    pub fn resolve_named(&self, name: &str) -> BeanResult<Arc<BeanDefinition>> {
        let key = ResolutionKey::new(BaseType::object(), &[Qualifier::named(name)]);
        self.resolve(&key)
    }

    /// Finds a bean visible from this archive by its passivation id.
    pub fn bean_by_passivation_id(&self, id: &str) -> Option<Arc<BeanDefinition>> {
        self.ancestry()
            .flat_map(|m| m.registry.beans())
            .find(|b| b.passivation_id() == id)
    }

    fn built_in(&self, key: &ResolutionKey) -> BeanResult<Option<Arc<BeanDefinition>>> {
        let kind = match key.ty().raw_name() {
            INSTANCE_TYPE => BuiltIn::Instance,
            EVENT_TYPE => BuiltIn::Event,
            INJECTION_POINT_TYPE => BuiltIn::InjectionPoint,
            _ => return Ok(None),
        };
        if let Some(bean) = self.built_ins.read().get(key) {
            return Ok(Some(bean.clone()));
        }

        let mut builder = BeanBuilder::new(key.ty().raw_name())
            .exposed_type(key.ty().clone())
            .archive(self.archive.clone())
            .built_in(kind);
        for q in key.qualifiers() {
            builder = builder.qualifier(q.clone());
        }
        let bean = Arc::new(builder.build()?);
        let bean = self
            .built_ins
            .write()
            .entry(key.clone())
            .or_insert(bean)
            .clone();
        Ok(Some(bean))
    }

    /// The synthetic bean standing for a decorator's `@Delegate` point.
    pub(crate) fn delegate_bean(&self, ty: &BaseType) -> BeanResult<Arc<BeanDefinition>> {
        let key = ResolutionKey::new(ty.clone(), &[Qualifier::new("Delegate")]);
        if let Some(bean) = self.built_ins.read().get(&key) {
            return Ok(bean.clone());
        }
        let bean = Arc::new(
            BeanBuilder::new("Delegate")
                .exposed_type(ty.clone())
                .archive(self.archive.clone())
                .built_in(BuiltIn::Delegate)
                .build()?,
        );
        Ok(self.built_ins.write().entry(key).or_insert(bean).clone())
    }
}

impl DeploymentView for BeanManager {
    fn archive(&self) -> &str {
        &self.archive
    }

    fn alternative_index(&self, bean_class: &str) -> Option<usize> {
        self.deployment.read().alternative_index(bean_class)
    }

    fn stereotype_priority(&self, stereotype: &str) -> Option<i32> {
        self.ancestry()
            .find_map(|m| m.deployment.read().stereotype_priority(stereotype))
    }
}

impl std::fmt::Debug for BeanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanManager")
            .field("archive", &self.archive)
            .field("parent", &self.parent.as_ref().map(|p| p.archive.clone()))
            .field("beans", &self.registry.len())
            .finish()
    }
}
