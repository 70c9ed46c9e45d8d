//! The closed set of WAMP session messages.
//!
//! Every record a client session sends or receives is one variant of
//! [`Message`]. Records that answer a request carry that request's id in
//! `request`; EVENT and INVOCATION instead carry the subscription or
//! registration they target.

use serde::{Deserialize, Serialize};

use crate::options::{CallOptions, PublishOptions, RegisterOptions, SubscribeOptions};
use crate::types::{Args, Id, Kwargs};

/// The request kind an ERROR message answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
	Publish,
	Subscribe,
	Unsubscribe,
	Call,
	Register,
	Unregister,
	Invocation,
}

impl RequestType {
	/// WAMP message type code of the request this kind refers to.
	pub fn code(self) -> u8 {
		match self {
			RequestType::Publish => 16,
			RequestType::Subscribe => 32,
			RequestType::Unsubscribe => 34,
			RequestType::Call => 48,
			RequestType::Register => 64,
			RequestType::Unregister => 66,
			RequestType::Invocation => 68,
		}
	}
}

/// PUBLISH: publish an event to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publish {
	pub request: Id,
	#[serde(default)]
	pub options: PublishOptions,
	pub topic: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// PUBLISHED: acknowledges a PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
	pub request: Id,
	pub publication: Id,
}

/// SUBSCRIBE: subscribe to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
	pub request: Id,
	#[serde(default)]
	pub options: SubscribeOptions,
	pub topic: String,
}

/// SUBSCRIBED: acknowledges a SUBSCRIBE with the broker-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribed {
	pub request: Id,
	pub subscription: Id,
}

/// UNSUBSCRIBE: drop a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsubscribe {
	pub request: Id,
	pub subscription: Id,
}

/// UNSUBSCRIBED: acknowledges an UNSUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsubscribed {
	pub request: Id,
}

/// EVENT: a publication delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub subscription: Id,
	pub publication: Id,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// CALL: call a remote procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
	pub request: Id,
	#[serde(default)]
	pub options: CallOptions,
	pub procedure: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// RESULT: the outcome of a CALL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
	pub request: Id,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// REGISTER: offer a procedure to the dealer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
	pub request: Id,
	#[serde(default)]
	pub options: RegisterOptions,
	pub procedure: String,
}

/// REGISTERED: acknowledges a REGISTER with the dealer-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registered {
	pub request: Id,
	pub registration: Id,
}

/// UNREGISTER: withdraw a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unregister {
	pub request: Id,
	pub registration: Id,
}

/// UNREGISTERED: acknowledges an UNREGISTER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unregistered {
	pub request: Id,
}

/// INVOCATION: the dealer routes a call to a local registration.
///
/// `request` is the invocation id assigned by the dealer; the answering
/// YIELD or ERROR must reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
	pub request: Id,
	pub registration: Id,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// YIELD: a callee's result for an INVOCATION.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yield {
	pub request: Id,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

/// ERROR: failure answer to a request of kind `request_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
	pub request_type: RequestType,
	pub request: Id,
	pub error: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	#[serde(default, skip_serializing_if = "Kwargs::is_empty")]
	pub kwargs: Kwargs,
}

impl ErrorMessage {
	/// Creates an ERROR without payload.
	pub fn new(request_type: RequestType, request: Id, error: impl Into<String>) -> Self {
		Self {
			request_type,
			request,
			error: error.into(),
			args: Args::new(),
			kwargs: Kwargs::new(),
		}
	}
}

/// Discriminated union of session messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
	Error(ErrorMessage),
	Publish(Publish),
	Published(Published),
	Subscribe(Subscribe),
	Subscribed(Subscribed),
	Unsubscribe(Unsubscribe),
	Unsubscribed(Unsubscribed),
	Event(Event),
	Call(Call),
	Result(ResultMessage),
	Register(Register),
	Registered(Registered),
	Unregister(Unregister),
	Unregistered(Unregistered),
	Invocation(Invocation),
	Yield(Yield),
}

impl Message {
	/// WAMP v2 message type code.
	pub fn code(&self) -> u8 {
		match self {
			Message::Error(_) => 8,
			Message::Publish(_) => 16,
			Message::Published(_) => 17,
			Message::Subscribe(_) => 32,
			Message::Subscribed(_) => 33,
			Message::Unsubscribe(_) => 34,
			Message::Unsubscribed(_) => 35,
			Message::Event(_) => 36,
			Message::Call(_) => 48,
			Message::Result(_) => 50,
			Message::Register(_) => 64,
			Message::Registered(_) => 65,
			Message::Unregister(_) => 66,
			Message::Unregistered(_) => 67,
			Message::Invocation(_) => 68,
			Message::Yield(_) => 70,
		}
	}

	/// Upper-case message name, as WAMP documents it.
	pub fn name(&self) -> &'static str {
		match self {
			Message::Error(_) => "ERROR",
			Message::Publish(_) => "PUBLISH",
			Message::Published(_) => "PUBLISHED",
			Message::Subscribe(_) => "SUBSCRIBE",
			Message::Subscribed(_) => "SUBSCRIBED",
			Message::Unsubscribe(_) => "UNSUBSCRIBE",
			Message::Unsubscribed(_) => "UNSUBSCRIBED",
			Message::Event(_) => "EVENT",
			Message::Call(_) => "CALL",
			Message::Result(_) => "RESULT",
			Message::Register(_) => "REGISTER",
			Message::Registered(_) => "REGISTERED",
			Message::Unregister(_) => "UNREGISTER",
			Message::Unregistered(_) => "UNREGISTERED",
			Message::Invocation(_) => "INVOCATION",
			Message::Yield(_) => "YIELD",
		}
	}
}
