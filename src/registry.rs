//! Per-archive bean registry indexed by raw exposed type.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanId};
use crate::key::ResolutionKey;
use crate::qualifier::QualifierMatcher;
use crate::types::TypeHierarchy;

/// Shared list of matching beans.
pub type BeanSet = Arc<[Arc<BeanDefinition>]>;

/// Bean registry
///
/// Beans are filed under the raw name of every exposed type. Lookups match
/// the requested type against each exposed type of the bucket's beans and
/// then check qualifiers. Results are memoized per [`ResolutionKey`]; every
/// `index` bumps a version counter, and a memoized entry from an older
/// version is recomputed on its next use.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_beans::{BaseType, BeanBuilder, BeanRegistry, ClassHierarchy, Qualifier, ResolutionKey};
///
/// let registry = BeanRegistry::new(Arc::new(ClassHierarchy::new()));
/// registry.index(Arc::new(
///     BeanBuilder::new("FastService")
///         .types(&["Service"])
///         .qualifier(Qualifier::new("Fast"))
///         .constructor(vec![], |_| Ok(()))
///         .build()
///         .unwrap(),
/// ));
///
/// let fast = ResolutionKey::new(BaseType::class("Service"), &[Qualifier::new("Fast")]);
/// assert_eq!(registry.lookup(&fast).len(), 1);
///
/// let default = ResolutionKey::new(BaseType::class("Service"), &[]);
/// assert!(registry.lookup(&default).is_empty());
/// ```
pub struct BeanRegistry {
    hierarchy: Arc<dyn TypeHierarchy>,
    buckets: RwLock<AHashMap<Arc<str>, Vec<Arc<BeanDefinition>>>>,
    all: RwLock<Vec<Arc<BeanDefinition>>>,
    version: AtomicU64,
    memo: RwLock<AHashMap<ResolutionKey, (u64, BeanSet)>>,
}

impl BeanRegistry {
    pub fn new(hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        Self {
            hierarchy,
            buckets: RwLock::new(AHashMap::new()),
            all: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
            memo: RwLock::new(AHashMap::new()),
        }
    }

    pub fn hierarchy(&self) -> &Arc<dyn TypeHierarchy> {
        &self.hierarchy
    }

    /// Files `bean` under each of its exposed types.
    pub fn index(&self, bean: Arc<BeanDefinition>) {
        {
            let mut buckets = self.buckets.write();
            let mut seen: Vec<&str> = Vec::new();
            for ty in bean.types() {
                let raw = ty.raw_name();
                if seen.contains(&raw) {
                    continue;
                }
                seen.push(raw);
                buckets
                    .entry(Arc::from(raw))
                    .or_default()
                    .push(bean.clone());
            }
            self.all.write().push(bean.clone());
        }
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            target: "ferrous_beans::registry",
            bean = %bean.display(),
            version,
            "indexed bean"
        );
    }

    /// Monotonic counter bumped by every `index`.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Every bean whose exposed types satisfy the key's type and whose
    /// qualifiers satisfy every requested qualifier. The universal request
    /// (`Object` without qualifiers) returns all beans.
    pub fn lookup(&self, key: &ResolutionKey) -> BeanSet {
        if key.is_universal() {
            return self.all.read().iter().cloned().collect();
        }

        let version = self.version();
        if let Some((cached_version, beans)) = self.memo.read().get(key) {
            if *cached_version == version {
                return beans.clone();
            }
        }

        let beans: BeanSet = self.compute(key).into();
        self.memo
            .write()
            .insert(key.clone(), (version, beans.clone()));
        beans
    }

    fn compute(&self, key: &ResolutionKey) -> Vec<Arc<BeanDefinition>> {
        let buckets = self.buckets.read();
        let Some(bucket) = buckets.get(key.ty().raw_name()) else {
            return Vec::new();
        };
        let hierarchy = &*self.hierarchy;
        let mut out: Vec<Arc<BeanDefinition>> = Vec::new();
        for bean in bucket {
            if out.iter().any(|b| b.id() == bean.id()) {
                continue;
            }
            let type_ok = bean
                .types()
                .iter()
                .any(|t| key.ty().is_assignable_from(t, hierarchy));
            if type_ok && QualifierMatcher::matches_all(key.qualifiers(), bean.qualifiers()) {
                out.push(bean.clone());
            }
        }
        out
    }

    /// Every indexed bean in registration order.
    pub fn beans(&self) -> Vec<Arc<BeanDefinition>> {
        self.all.read().clone()
    }

    pub fn get(&self, id: BeanId) -> Option<Arc<BeanDefinition>> {
        self.all.read().iter().find(|b| b.id() == id).cloned()
    }

    /// Beans declaring `name`.
    pub fn by_name(&self, name: &str) -> Vec<Arc<BeanDefinition>> {
        self.all
            .read()
            .iter()
            .filter(|b| b.name() == Some(name))
            .cloned()
            .collect()
    }

    /// Beans implemented by `bean_class`.
    pub fn by_class(&self, bean_class: &str) -> Vec<Arc<BeanDefinition>> {
        self.all
            .read()
            .iter()
            .filter(|b| b.bean_class() == bean_class)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.all.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("beans", &self.len())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanBuilder;
    use crate::qualifier::Qualifier;
    use crate::types::{BaseType, ClassHierarchy};

    fn bean(class: &str, types: &[&str]) -> Arc<BeanDefinition> {
        Arc::new(
            BeanBuilder::new(class)
                .types(types)
                .constructor(vec![], |_| Ok(()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn memo_is_revalidated_after_index() {
        let registry = BeanRegistry::new(Arc::new(ClassHierarchy::new()));
        let key = ResolutionKey::new(BaseType::class("Service"), &[]);
        registry.index(bean("A", &["Service"]));
        assert_eq!(registry.lookup(&key).len(), 1);
        registry.index(bean("B", &["Service"]));
        assert_eq!(registry.lookup(&key).len(), 2);
    }

    #[test]
    fn universal_request_returns_everything() {
        let registry = BeanRegistry::new(Arc::new(ClassHierarchy::new()));
        registry.index(bean("A", &["Service"]));
        registry.index(Arc::new(
            BeanBuilder::new("B")
                .qualifier(Qualifier::new("Special"))
                .constructor(vec![], |_| Ok(()))
                .build()
                .unwrap(),
        ));
        let all = ResolutionKey::new(BaseType::object(), &[]);
        assert_eq!(registry.lookup(&all).len(), 2);
        // explicit @Default is a real qualifier request
        let default = ResolutionKey::new(BaseType::object(), &[Qualifier::default_qualifier()]);
        assert_eq!(registry.lookup(&default).len(), 1);
    }

    #[test]
    fn generic_buckets_dedupe() {
        let registry = BeanRegistry::new(Arc::new(ClassHierarchy::new()));
        registry.index(bean("Both", &["List<String>", "List<Integer>"]));
        let key = ResolutionKey::new(BaseType::class("List"), &[]);
        assert_eq!(registry.lookup(&key).len(), 1);
        let strings = ResolutionKey::new(BaseType::parse("List<String>").unwrap(), &[]);
        assert_eq!(registry.lookup(&strings).len(), 1);
        let longs = ResolutionKey::new(BaseType::parse("List<Long>").unwrap(), &[]);
        assert!(registry.lookup(&longs).is_empty());
    }
}
