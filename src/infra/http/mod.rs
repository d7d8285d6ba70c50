//! HTTP access to the marketplace API.

mod client;
mod error;

pub use client::{HttpTransport, Transport};
pub use error::NetworkError;
