//! Error kinds for common WAMP error URIs.
//!
//! Neither is mapped by default; call `define` with the kind's `URI`.

use std::fmt;

use wamp_protocol::{Kwargs, Payload, uri};

use super::{ErrorFields, ErrorKind};

/// The peer refused the action for this session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotAuthorized {
	pub message: Option<String>,
	pub extra: Kwargs,
}

impl NotAuthorized {
	pub const URI: &'static str = uri::NOT_AUTHORIZED;
}

impl fmt::Display for NotAuthorized {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "Not authorized: {message}"),
			None => f.write_str("Not authorized"),
		}
	}
}

impl ErrorKind for NotAuthorized {
	fn fields() -> &'static [&'static str] {
		&["message"]
	}

	fn from_fields(mut fields: ErrorFields) -> Self {
		Self {
			message: fields.take_string("message"),
			extra: fields.take_extra(),
		}
	}

	fn to_payload(&self) -> Payload {
		message_payload(self.message.as_deref(), &self.extra)
	}
}

/// The topic of a publish or subscribe was rejected as invalid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidTopic {
	pub message: Option<String>,
	pub extra: Kwargs,
}

impl InvalidTopic {
	pub const URI: &'static str = uri::INVALID_TOPIC;
}

impl fmt::Display for InvalidTopic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "Invalid topic: {message}"),
			None => f.write_str("Invalid topic"),
		}
	}
}

impl ErrorKind for InvalidTopic {
	fn fields() -> &'static [&'static str] {
		&["message"]
	}

	fn from_fields(mut fields: ErrorFields) -> Self {
		Self {
			message: fields.take_string("message"),
			extra: fields.take_extra(),
		}
	}

	fn to_payload(&self) -> Payload {
		message_payload(self.message.as_deref(), &self.extra)
	}
}

fn message_payload(message: Option<&str>, extra: &Kwargs) -> Payload {
	let mut payload = Payload::from_parts(Vec::new(), extra.clone());
	if let Some(message) = message {
		payload = payload.arg(message);
	}
	payload
}
