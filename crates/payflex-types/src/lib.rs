//! Shared data model for the Payflex gateway.
//!
//! Types in this crate are used across the storage, order store, provider
//! and core crates: the local order as seen by the host commerce platform,
//! the remote order owned by the payment provider, the workflow status that
//! tracks reconciliation progress, and the untrusted parameters that arrive
//! when a shopper returns from the provider's hosted pages.

pub mod callback;
pub mod order;
pub mod remote;
pub mod workflow;

pub use callback::*;
pub use order::*;
pub use remote::*;
pub use workflow::*;
