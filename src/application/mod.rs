//! Application services built on the sync core.

pub mod error;
pub mod product_page;

pub use product_page::ProductPage;
