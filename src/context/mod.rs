//! Creational contexts and scope contexts.

mod active;
mod creational;
mod store;

pub use active::ActiveContexts;
pub use creational::{CreationalContext, LifecycleState};
pub(crate) use creational::{same_instance, InFlight};
pub use store::{Created, InstanceStore, ScopeContext};
