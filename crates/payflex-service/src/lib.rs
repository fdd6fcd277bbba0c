//! Service wiring for the Payflex gateway.
//!
//! - `factories`: registers the concrete storage, order store and provider
//!   backends with the engine builder.
//! - `api`: the HTTP surface the shop front end and support tooling call.

pub mod api;
pub mod factories;
