//! Domain layer types and invariants.

pub mod product;

pub use product::{ProductRoutes, ProductToggle};
