//! Order lifecycle reconciliation engine for the Payflex gateway.
//!
//! The engine ties the order store and the provider client together:
//!
//! - `CheckoutInitiator` creates the remote order and stores its identifiers.
//! - `CallbackReconciler` verifies the shopper's return against the provider
//!   and applies the outcome to the local order.
//! - `Sweeper` recovers orders whose outcome was never reported.
//! - `RefundHandler` and `PaymentAvailability` cover refunds and the
//!   provider's payment limits.
//!
//! All paths that change an order go through `WorkflowState`, which owns the
//! transition rules and the legacy metadata fallbacks.

use payflex_orders::OrderStoreError;
use payflex_provider::ProviderError;
use thiserror::Error;

mod availability;
mod builder;
mod callback;
mod checkout;
mod engine;
mod redirect;
mod refund;
mod scope;
mod sweeper;
mod workflow;

#[cfg(test)]
mod test_support;

pub use availability::PaymentAvailability;
pub use builder::GatewayBuilder;
pub use callback::CallbackReconciler;
pub use checkout::{CheckoutInitiator, CheckoutResult};
pub use engine::GatewayEngine;
pub use redirect::Redirect;
pub use refund::{RefundHandler, RefundPath};
pub use scope::RequestScope;
pub use sweeper::{AgeBucket, SweepReport, Sweeper};
pub use workflow::{VerifiedBy, VerifiedOrder, WorkflowState};

/// Errors surfaced by the gateway engine.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Order store error: {0}")]
	OrderStore(#[from] OrderStoreError),
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
}
