//! Result of a completed CALL.

use serde::de::DeserializeOwned;
use serde_json::Value;
use wamp_protocol::{Args, Kwargs, Payload};

use crate::error::Result;

/// Positional and keyword results of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResults {
	pub results: Args,
	pub kwresults: Kwargs,
}

/// What a call resolves to.
///
/// A RESULT with exactly one positional value and no keyword values
/// unwraps to [`CallResult::Value`]; anything else (including an empty
/// RESULT) is [`CallResult::Structured`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
	Value(Value),
	Structured(CallResults),
}

impl CallResult {
	pub fn from_payload(payload: Payload) -> Self {
		let (mut args, kwargs) = payload.into_parts();
		if args.len() == 1 && kwargs.is_empty() {
			let value = args.pop().unwrap_or(Value::Null);
			return CallResult::Value(value);
		}
		CallResult::Structured(CallResults {
			results: args,
			kwresults: kwargs,
		})
	}

	/// The unwrapped single value, if the result has that shape.
	pub fn value(&self) -> Option<&Value> {
		match self {
			CallResult::Value(value) => Some(value),
			CallResult::Structured(_) => None,
		}
	}

	pub fn into_value(self) -> Option<Value> {
		match self {
			CallResult::Value(value) => Some(value),
			CallResult::Structured(_) => None,
		}
	}

	/// The structured results, if the result has that shape.
	pub fn structured(&self) -> Option<&CallResults> {
		match self {
			CallResult::Value(_) => None,
			CallResult::Structured(results) => Some(results),
		}
	}

	/// Deserializes the result into `T`.
	///
	/// A single value decodes directly. Structured results decode from the
	/// keyword results when there are any, otherwise from the positional
	/// results as a JSON array.
	pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
		let value = match self {
			CallResult::Value(value) => value,
			CallResult::Structured(CallResults { kwresults, .. }) if !kwresults.is_empty() => {
				Value::Object(kwresults)
			}
			CallResult::Structured(CallResults { results, .. }) => Value::Array(results),
		};
		Ok(serde_json::from_value(value)?)
	}

	/// Converts back into raw arguments.
	pub fn into_payload(self) -> Payload {
		match self {
			CallResult::Value(value) => Payload::value(value),
			CallResult::Structured(CallResults { results, kwresults }) => Payload::from_parts(results, kwresults),
		}
	}
}
