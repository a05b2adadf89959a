//! # ferrous-beans
//!
//! A contextual bean container: typesafe resolution by type and qualifiers,
//! scoped lifecycles, interceptors, decorators and events.
//!
//! ## Features
//!
//! - **Typesafe resolution**: beans are matched by assignable type and
//!   qualifier set, with alternatives ranked by priority and archive
//! - **Scopes**: dependent, singleton and the normal scopes (application,
//!   request, session, conversation, custom) backed by scope contexts
//! - **Creational contexts**: dependents are destroyed with the instance
//!   that owns them, in reverse creation order
//! - **Interceptors and decorators**: ordered chains around construction,
//!   callbacks and business methods
//! - **Discovery**: archives with deployment descriptors, exclude filters,
//!   stereotypes, producers, disposers and specialization
//! - **Events**: observer methods with qualifiers and priorities
//! - **Validation**: every definition problem is reported before first use
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ferrous_beans::{BeanBuilder, BeanLookup, ContainerBuilder, InjectionPoint, Qualifier, ScopeKind};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! struct Formal;
//! impl Greeter for Formal {
//!     fn greet(&self, name: &str) -> String {
//!         format!("Good day, {}", name)
//!     }
//! }
//!
//! struct Casual;
//! impl Greeter for Casual {
//!     fn greet(&self, name: &str) -> String {
//!         format!("hey {}", name)
//!     }
//! }
//!
//! struct Reception {
//!     greeter: Arc<dyn Greeter>,
//! }
//!
//! let casual = Qualifier::new("Casual");
//! let container = ContainerBuilder::new()
//!     .bean(
//!         BeanBuilder::new("Formal")
//!             .types(&["Greeter"])
//!             .scope(ScopeKind::Singleton)
//!             .constructor(vec![], |_| Ok(Arc::new(Formal) as Arc<dyn Greeter>)),
//!     )
//!     .bean(
//!         BeanBuilder::new("Casual")
//!             .types(&["Greeter"])
//!             .qualifier(casual.clone())
//!             .constructor(vec![], |_| Ok(Arc::new(Casual) as Arc<dyn Greeter>)),
//!     )
//!     .bean(
//!         BeanBuilder::new("Reception").constructor(
//!             vec![InjectionPoint::of("Greeter").qualified(casual.clone())],
//!             |args| {
//!                 let greeter = args.get::<Arc<dyn Greeter>>(0)?;
//!                 Ok(Reception { greeter: (*greeter).clone() })
//!             },
//!         ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let reception = container.get::<Reception>("Reception", &[]).unwrap();
//! assert_eq!(reception.greeter.greet("Ada"), "hey Ada");
//!
//! let formal = container.get::<Arc<dyn Greeter>>("Greeter", &[]).unwrap();
//! assert_eq!(formal.greet("Ada"), "Good day, Ada");
//! container.shutdown().unwrap();
//! ```
//!
//! ## Scopes
//!
//! - **Dependent**: a new instance per injection point, owned by its client
//! - **Singleton**: one instance per container, never proxied
//! - **Application**: one instance per container, behind a client proxy when
//!   a [`ProxyProvider`] is installed
//! - **Request, Session, Conversation, custom**: one instance per entered
//!   [`ScopeHandle`]
//!
//! ## Logging
//!
//! The container logs through [`tracing`] under `ferrous_beans::*` targets:
//! discovery and validation at `debug`, creation and destruction at `trace`,
//! failures at `warn` and `error`.

pub mod bean;
pub mod config;
pub mod container;
pub mod context;
pub mod decoration;
pub mod deployment;
pub mod discovery;
pub mod error;
pub mod event;
pub mod instance;
pub mod interception;
pub mod introspect;
pub mod key;
pub mod lifecycle;
pub mod observer;
pub mod passivation;
pub mod qualifier;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod startup;
pub mod traits;
pub mod types;
pub mod validation;

mod internal;

// Definitions
pub use bean::{
    downcast, downcast_trait, AnyArc, Arguments, ArchiveId, BeanBuilder, BeanDefinition, BeanId, BeanKind,
    BuiltIn, InjectionPoint, MemberKind, ProducerBuilder, Reference, Stereotype, ROOT_ARCHIVE,
};
pub use qualifier::{InterceptorBinding, Qualifier, QualifierMatcher, QualifierValue};
pub use scope::ScopeKind;
pub use types::{BaseType, ClassHierarchy, TypeHierarchy};

// Resolution
pub use deployment::Deployment;
pub use key::ResolutionKey;
pub use registry::BeanRegistry;
pub use resolver::BeanManager;

// Container
pub use container::{Container, ContainerBuilder, ScopeHandle};
pub use context::{ActiveContexts, CreationalContext, InstanceStore, ScopeContext};
pub use error::{BeanError, BeanResult};
pub use lifecycle::{LazyReference, LazyReferenceProvider, ProxyProvider};
pub use passivation::BeanHandle;
pub use startup::{EagerStart, StartupReport};
pub use traits::{BeanLookup, BeanLookupCore};

// Interceptors and decorators
pub use decoration::DecoratorMeta;
pub use interception::{
    DefaultEnhancement, EnhancementProvider, Intercepted, InterceptionType, InterceptorMeta, InvocationContext,
    ParamSpec,
};

// Events and built-ins
pub use event::{Event, ObserverMethod};
pub use instance::Instance;
pub use observer::{ContainerObserver, LoggingObserver};

// Discovery
pub use config::{BeansConfig, DiscoveryMode, EnvironmentProperties, ExcludeConfig, PropertySource};
pub use discovery::{
    AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, ArchiveSource, BeforeBeanDiscovery,
    DiscoveryExtension, ProcessAnnotatedType,
};
pub use introspect::{AnnotatedType, Annotation, ProducerMember, StaticIntrospector, TypeIntrospector};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};
