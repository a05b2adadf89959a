//! Core traits for the bean container.

mod lookup;

pub use lookup::{BeanLookup, BeanLookupCore};
