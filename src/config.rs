//! Deployment descriptors for bean archives.
//!
//! A [`BeansConfig`] plays the part of an archive's `beans.xml`: it enables
//! alternatives, interceptors and decorators, picks the discovery mode and
//! lists classes excluded from discovery. Descriptors are plain `serde`
//! structures and are usually loaded from JSON.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::deployment::Deployment;
use crate::error::{BeanError, BeanResult};

/// Which classes of an archive are bean candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Every discovered class.
    All,
    /// Only classes with a bean-defining annotation.
    Annotated,
    /// The archive is not a bean archive.
    None,
}

impl Default for DiscoveryMode {
    fn default() -> Self {
        DiscoveryMode::All
    }
}

/// Enabled alternatives, in ascending priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternativesConfig {
    pub classes: Vec<String>,
    pub stereotypes: Vec<String>,
}

/// A system property condition of an exclude filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCondition {
    pub name: String,
    /// Required value. Without one, the property only has to be set.
    #[serde(default)]
    pub value: Option<String>,
}

/// Removes matching classes from discovery.
///
/// `name` is a class name, `pkg.*` for the classes of one package or
/// `pkg.**` for a package and all of its subpackages. The filter applies
/// only when every condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeConfig {
    pub name: String,
    #[serde(default)]
    pub if_class_available: Vec<String>,
    #[serde(default)]
    pub if_class_not_available: Vec<String>,
    #[serde(default)]
    pub if_system_property: Vec<PropertyCondition>,
}

impl ExcludeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            if_class_available: Vec::new(),
            if_class_not_available: Vec::new(),
            if_system_property: Vec::new(),
        }
    }

    pub fn if_class_available(mut self, class: impl Into<String>) -> Self {
        self.if_class_available.push(class.into());
        self
    }

    pub fn if_class_not_available(mut self, class: impl Into<String>) -> Self {
        self.if_class_not_available.push(class.into());
        self
    }

    pub fn if_system_property(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.if_system_property.push(PropertyCondition {
            name: name.into(),
            value: value.map(str::to_string),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub exclude: Vec<ExcludeConfig>,
}

/// Deployment descriptor of one archive.
///
/// # Examples
///
/// ```rust
/// use ferrous_beans::{BeansConfig, DiscoveryMode};
///
/// let config = BeansConfig::from_json(r#"{
///     "discovery": "annotated",
///     "alternatives": { "classes": ["com.acme.MockPayments"] },
///     "interceptors": ["com.acme.TxInterceptor"],
///     "scan": { "exclude": [ { "name": "com.acme.internal.**" } ] }
/// }"#).unwrap();
///
/// assert_eq!(config.discovery, DiscoveryMode::Annotated);
/// assert_eq!(config.interceptors, vec!["com.acme.TxInterceptor".to_string()]);
/// assert!(config.decorators.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeansConfig {
    pub discovery: DiscoveryMode,
    pub alternatives: AlternativesConfig,
    pub interceptors: Vec<String>,
    pub decorators: Vec<String>,
    pub scan: ScanConfig,
}

impl BeansConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> BeanResult<Self> {
        serde_json::from_str(json).map_err(|e| BeanError::Config(format!("invalid beans config: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> BeanResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BeanError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> BeanResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BeanError::Config(e.to_string()))
    }

    pub fn discovery(mut self, mode: DiscoveryMode) -> Self {
        self.discovery = mode;
        self
    }

    pub fn alternative(mut self, class: impl Into<String>) -> Self {
        self.alternatives.classes.push(class.into());
        self
    }

    pub fn alternative_stereotype(mut self, stereotype: impl Into<String>) -> Self {
        self.alternatives.stereotypes.push(stereotype.into());
        self
    }

    pub fn interceptor(mut self, class: impl Into<String>) -> Self {
        self.interceptors.push(class.into());
        self
    }

    pub fn decorator(mut self, class: impl Into<String>) -> Self {
        self.decorators.push(class.into());
        self
    }

    pub fn exclude(mut self, filter: ExcludeConfig) -> Self {
        self.scan.exclude.push(filter);
        self
    }

    /// Enables the configured lists on `deployment`, in order.
    pub fn apply_to(&self, deployment: &mut Deployment) -> BeanResult<()> {
        for class in &self.alternatives.classes {
            deployment.enable_alternative(Arc::<str>::from(class.as_str()));
        }
        for stereotype in &self.alternatives.stereotypes {
            deployment.enable_stereotype(Arc::<str>::from(stereotype.as_str()));
        }
        for class in &self.interceptors {
            deployment.enable_interceptor(Arc::<str>::from(class.as_str()))?;
        }
        for class in &self.decorators {
            deployment.enable_decorator(Arc::<str>::from(class.as_str()))?;
        }
        Ok(())
    }

    /// Every class named by an enablement list, with the list's name.
    pub fn enabled_classes(&self) -> impl Iterator<Item = (EnabledList, &str)> {
        self.alternatives
            .classes
            .iter()
            .map(|c| (EnabledList::Alternatives, c.as_str()))
            .chain(self.interceptors.iter().map(|c| (EnabledList::Interceptors, c.as_str())))
            .chain(self.decorators.iter().map(|c| (EnabledList::Decorators, c.as_str())))
    }
}

/// The enablement lists of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnabledList {
    Alternatives,
    Interceptors,
    Decorators,
}

impl fmt::Display for EnabledList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnabledList::Alternatives => "alternatives",
            EnabledList::Interceptors => "interceptors",
            EnabledList::Decorators => "decorators",
        })
    }
}

/// Source of system properties for exclude conditions.
pub trait PropertySource: Send + Sync {
    fn property(&self, name: &str) -> Option<String>;
}

/// Reads properties from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentProperties;

impl PropertySource for EnvironmentProperties {
    fn property(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl PropertySource for std::collections::HashMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
