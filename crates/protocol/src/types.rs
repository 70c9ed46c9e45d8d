//! Primitive values shared by every message record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session-scoped identifier for requests, subscriptions, registrations,
/// publications and invocations.
pub type Id = u64;

/// Largest valid identifier. WAMP ids must round-trip through IEEE-754
/// doubles, so they are limited to 53 bits.
pub const MAX_ID: Id = 1 << 53;

/// Positional arguments.
pub type Args = Vec<Value>;

/// Keyword arguments.
pub type Kwargs = Map<String, Value>;

/// Application payload carried by publications, calls, events, invocations
/// and their results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
	/// Positional arguments
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Args,
	/// Keyword arguments
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub kwargs: Kwargs,
}

impl Payload {
	/// Creates an empty payload.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a payload from raw positional and keyword arguments.
	pub fn from_parts(args: Args, kwargs: Kwargs) -> Self {
		Self { args, kwargs }
	}

	/// Creates a payload carrying a single positional value.
	pub fn value(value: impl Into<Value>) -> Self {
		Self::new().arg(value)
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	/// Appends several positional arguments.
	pub fn args<I, V>(mut self, values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		self.args.extend(values.into_iter().map(Into::into));
		self
	}

	/// Sets a keyword argument, replacing any previous value for `name`.
	pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.kwargs.insert(name.into(), value.into());
		self
	}

	/// Returns true if there are neither positional nor keyword arguments.
	pub fn is_empty(&self) -> bool {
		self.args.is_empty() && self.kwargs.is_empty()
	}

	/// Splits into positional and keyword arguments.
	pub fn into_parts(self) -> (Args, Kwargs) {
		(self.args, self.kwargs)
	}
}
