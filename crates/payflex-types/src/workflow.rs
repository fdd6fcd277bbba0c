//! Workflow status and the metadata fields that carry it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::RemoteOrderStatus;

/// Gateway-private progress marker stored on a local order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
	Initiated,
	Completed,
	Failed,
	Abandoned,
}

impl WorkflowStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Initiated => "initiated",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Abandoned => "abandoned",
		}
	}

	/// Checks a reconciliation transition from `self` to `next`.
	///
	/// Forward transitions out of `initiated` are always allowed. A failed or
	/// abandoned workflow can only be superseded by `completed`, and only when
	/// the provider reports the order as approved. `completed` is absorbing.
	/// Re-entering the current status is accepted and treated as a no-op by
	/// callers.
	pub fn can_transition_to(&self, next: WorkflowStatus, remote: Option<&RemoteOrderStatus>) -> bool {
		if *self == next {
			return true;
		}
		match (self, next) {
			(Self::Initiated, _) => true,
			(Self::Failed | Self::Abandoned, Self::Completed) => {
				matches!(remote, Some(RemoteOrderStatus::Approved))
			}
			_ => false,
		}
	}
}

impl fmt::Display for WorkflowStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unknown workflow status: {0}")]
pub struct UnknownWorkflowStatus(pub String);

impl FromStr for WorkflowStatus {
	type Err = UnknownWorkflowStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"initiated" => Ok(Self::Initiated),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			"abandoned" => Ok(Self::Abandoned),
			other => Err(UnknownWorkflowStatus(other.to_string())),
		}
	}
}

/// Logical metadata fields the gateway reads and writes on a local order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaField {
	OrderToken,
	OrderId,
	RedirectUrl,
	WorkflowStatus,
}

impl MetaField {
	/// Storage names, current name first, then legacy names in lookup order.
	pub fn aliases(&self) -> &'static [&'static str] {
		match self {
			Self::OrderToken => &["_payflex_order_token", "_partpay_order_token"],
			Self::OrderId => &["_payflex_order_id", "_partpay_order_id"],
			Self::RedirectUrl => &["_payflex_redirect_url", "_order_redirectURL"],
			Self::WorkflowStatus => &["_payflex_workflow_status"],
		}
	}

	/// Name used for new writes.
	pub fn current(&self) -> &'static str {
		self.aliases()[0]
	}
}
