//! Per-worker request execution.
//!
//! A [`GrpcRequesterFactory`] is configured once and hands out one
//! [`GrpcRequester`] per simulated client. The engine drives each requester
//! through `setup`, repeated `request` calls, and `teardown` via the
//! [`Requester`] and [`RequesterFactory`] traits.
//!
//! ## Structure
//!
//! - [`config`] - Validated factory configuration and header parsing.
//! - [`factory`] - Compute-once caches for the method, payload and shared
//!   connection.
//! - [`requester`] - The per-worker call state machine.
//! - [`interface`] - Engine-facing traits.

pub mod config;
pub mod factory;
pub mod interface;
#[allow(clippy::module_inception)]
pub mod requester;

#[cfg(test)]
mod tests;

pub use config::{ConnectionPolicy, FactoryConfig, FactoryConfigBuilder, parse_headers};
pub use factory::GrpcRequesterFactory;
pub use interface::{Requester, RequesterFactory};
pub use requester::GrpcRequester;
