//! Network side of the dispatcher: request/response types and the fetch seam.

mod client;
#[cfg(test)]
pub mod mock;
mod types;

pub use client::{HttpNetwork, Network};
pub use types::{CacheMode, Request, Response, ResponseKind};
