//! Class-name exclude filters.

use glob::{MatchOptions, Pattern};

use crate::config::{ExcludeConfig, PropertySource};
use crate::error::{BeanError, BeanResult};
use crate::introspect::TypeIntrospector;

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One compiled exclude filter.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    pattern: Pattern,
    config: ExcludeConfig,
}

impl ExcludeFilter {
    /// Compiles `config.name`. Package separators become path separators,
    /// so `pkg.*` stops at the package boundary while `pkg.**` descends.
    pub fn compile(config: &ExcludeConfig) -> BeanResult<Self> {
        let path = to_path(&config.name);
        let pattern = Pattern::new(&path).map_err(|e| {
            BeanError::Config(format!("invalid exclude filter {:?}: {}", config.name, e))
        })?;
        Ok(Self {
            pattern,
            config: config.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn matches_name(&self, class_name: &str) -> bool {
        self.pattern.matches_with(&to_path(class_name), MATCH)
    }

    /// True when every condition attached to the filter holds.
    pub fn is_active(&self, introspector: &dyn TypeIntrospector, properties: &dyn PropertySource) -> bool {
        self.config
            .if_class_available
            .iter()
            .all(|c| introspector.is_available(c))
            && self
                .config
                .if_class_not_available
                .iter()
                .all(|c| !introspector.is_available(c))
            && self.config.if_system_property.iter().all(|p| {
                match (properties.property(&p.name), &p.value) {
                    (Some(actual), Some(expected)) => actual == *expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
    }
}

/// The exclude filters of one archive.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilters {
    filters: Vec<ExcludeFilter>,
}

impl ExcludeFilters {
    pub fn compile(configs: &[ExcludeConfig]) -> BeanResult<Self> {
        let filters = configs
            .iter()
            .map(ExcludeFilter::compile)
            .collect::<BeanResult<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The first active filter matching `class_name`.
    pub fn excluding(
        &self,
        class_name: &str,
        introspector: &dyn TypeIntrospector,
        properties: &dyn PropertySource,
    ) -> Option<&ExcludeFilter> {
        self.filters
            .iter()
            .find(|f| f.matches_name(class_name) && f.is_active(introspector, properties))
    }
}

fn to_path(name: &str) -> String {
    name.replace('.', "/")
}
