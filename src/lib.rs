//! Client-side synchronization core for a marketplace product page.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod sync;
