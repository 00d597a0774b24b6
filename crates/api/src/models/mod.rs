pub mod element;
pub mod file;
pub mod ids;
pub mod metamodel;
pub mod value;

pub use element::*;
pub use file::*;
pub use ids::*;
pub use metamodel::*;
pub use value::*;
