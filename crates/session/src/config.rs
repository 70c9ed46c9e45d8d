//! Session configuration.

use serde::{Deserialize, Deserializer, Serialize};

/// Default limit on requests awaiting a reply.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Environment variable overriding [`SessionConfig::acknowledge_publish`].
pub const ENV_PUBLISH_ACKNOWLEDGE: &str = "WAMP_PUBLISH_ACKNOWLEDGE";

/// Environment variable overriding [`SessionConfig::max_pending`].
pub const ENV_MAX_PENDING: &str = "WAMP_MAX_PENDING";

/// Tunables for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SessionConfig {
	/// Whether `publish` asks for PUBLISHED/ERROR when the call's options
	/// leave `acknowledge` unset.
	pub acknowledge_publish: bool,

	/// Maximum number of requests awaiting a reply at once. Zero is not a
	/// valid limit and falls back to [`DEFAULT_MAX_PENDING`].
	#[serde(deserialize_with = "deserialize_max_pending")]
	pub max_pending: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			acknowledge_publish: true,
			max_pending: DEFAULT_MAX_PENDING,
		}
	}
}

impl SessionConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults overridden by `WAMP_PUBLISH_ACKNOWLEDGE` and
	/// `WAMP_MAX_PENDING`. Unparsable values are ignored with a warning.
	pub fn from_env() -> Self {
		let mut config = Self::default();

		if let Ok(raw) = std::env::var(ENV_PUBLISH_ACKNOWLEDGE) {
			match parse_bool(&raw) {
				Some(value) => config.acknowledge_publish = value,
				None => tracing::warn!(var = ENV_PUBLISH_ACKNOWLEDGE, value = %raw, "ignoring invalid boolean"),
			}
		}

		if let Ok(raw) = std::env::var(ENV_MAX_PENDING) {
			match raw.trim().parse::<usize>() {
				Ok(value) if value > 0 => config.max_pending = value,
				_ => tracing::warn!(var = ENV_MAX_PENDING, value = %raw, "ignoring invalid limit"),
			}
		}

		config
	}

	/// Sets the publish acknowledgement default.
	pub fn acknowledge_publish(mut self, acknowledge: bool) -> Self {
		self.acknowledge_publish = acknowledge;
		self
	}

	/// Sets the pending request limit. Zero is ignored with a warning.
	pub fn max_pending(mut self, max_pending: usize) -> Self {
		if max_pending == 0 {
			tracing::warn!("ignoring invalid limit: max_pending must be positive");
		} else {
			self.max_pending = max_pending;
		}
		self
	}
}

fn deserialize_max_pending<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
	D: Deserializer<'de>,
{
	let value = usize::deserialize(deserializer)?;
	if value == 0 {
		tracing::warn!("ignoring invalid limit: max_pending must be positive");
		return Ok(DEFAULT_MAX_PENDING);
	}
	Ok(value)
}

fn parse_bool(raw: &str) -> Option<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}
