//! Error types for the WAMP session layer.

use thiserror::Error;
use wamp_protocol::Id;

use crate::error_registry::ApplicationError;
use crate::pending::RequestKind;
use crate::session::SessionState;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the session layer.
#[derive(Debug, Error)]
pub enum Error {
	/// Operation attempted while the session is not established.
	#[error("Transport unavailable: session is {0}")]
	TransportUnavailable(SessionState),

	/// A request id was allocated twice while still pending.
	///
	/// This indicates a defect in id allocation, not a recoverable condition.
	#[error("Duplicate pending request: {kind} id={id}")]
	DuplicateRequest { kind: RequestKind, id: Id },

	/// The peer answered with an ERROR message.
	#[error(transparent)]
	Application(#[from] ApplicationError),

	/// The session closed while the request was still pending.
	#[error("Session disconnected: {0}")]
	Disconnected(String),

	/// Too many requests awaiting a reply.
	#[error("Too many pending requests (limit {0})")]
	TooManyPending(usize),

	/// Transport-level error.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (peer sent something the session cannot use).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Completion channel dropped without a value.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the application error if the peer answered with ERROR.
	pub fn application(&self) -> Option<&ApplicationError> {
		match self {
			Error::Application(err) => Some(err),
			_ => None,
		}
	}

	/// Returns the error URI if the peer answered with ERROR.
	pub fn error_uri(&self) -> Option<&str> {
		self.application().map(ApplicationError::uri)
	}

	/// Returns true if the request was force-completed by session close.
	pub fn is_disconnected(&self) -> bool {
		matches!(self, Error::Disconnected(_))
	}

	/// Returns true if the session was not established.
	pub fn is_transport_unavailable(&self) -> bool {
		matches!(self, Error::TransportUnavailable(_))
	}
}
