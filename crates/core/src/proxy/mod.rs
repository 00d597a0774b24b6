//! Unresolved cross-file references.

pub mod dictionary;
pub mod resolver;

pub use dictionary::{ProxyDictionary, ProxyTuple};
pub use resolver::{ProxyResolver, ResolveReport};
