//! Option structs for WAMP requests.
//!
//! These are forwarded verbatim inside the outbound records. The session
//! only interprets [`PublishOptions::acknowledge`]; everything else is the
//! peer's business.

use serde::{Deserialize, Serialize};

use crate::types::Id;

/// Options for PUBLISH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PublishOptions {
	/// Ask the broker to answer with PUBLISHED (or ERROR)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub acknowledge: Option<bool>,

	/// Whether the publisher is excluded from receiving its own event
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exclude_me: Option<bool>,

	/// Session ids that must not receive the event
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exclude: Option<Vec<Id>>,

	/// Session ids allowed to receive the event
	#[serde(skip_serializing_if = "Option::is_none")]
	pub eligible: Option<Vec<Id>>,
}

impl PublishOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets whether the publication must be acknowledged.
	pub fn acknowledge(mut self, acknowledge: bool) -> Self {
		self.acknowledge = Some(acknowledge);
		self
	}

	/// Sets whether the publisher receives its own event.
	pub fn exclude_me(mut self, exclude_me: bool) -> Self {
		self.exclude_me = Some(exclude_me);
		self
	}

	/// Sets the excluded session ids.
	pub fn exclude(mut self, sessions: impl Into<Vec<Id>>) -> Self {
		self.exclude = Some(sessions.into());
		self
	}

	/// Sets the eligible session ids.
	pub fn eligible(mut self, sessions: impl Into<Vec<Id>>) -> Self {
		self.eligible = Some(sessions.into());
		self
	}
}

/// Topic matching policy for SUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
	/// Topic must equal the subscription URI (default)
	#[default]
	Exact,
	/// Subscription URI is a prefix of the topic
	Prefix,
	/// Empty URI components match any component
	Wildcard,
}

/// Options for SUBSCRIBE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
	/// How the topic is matched against publications
	#[serde(rename = "match", skip_serializing_if = "Option::is_none")]
	pub match_policy: Option<MatchPolicy>,
}

impl SubscribeOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the match policy.
	pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
		self.match_policy = Some(policy);
		self
	}
}

/// Options for CALL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
	/// Dealer-side timeout in milliseconds
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u64>,
}

impl CallOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the timeout in milliseconds.
	pub fn timeout(mut self, timeout_ms: u64) -> Self {
		self.timeout = Some(timeout_ms);
		self
	}
}

/// Options for REGISTER.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOptions {
	/// Partition keys this registration serves
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pkeys: Option<Vec<u32>>,
}

impl RegisterOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the partition keys.
	pub fn pkeys(mut self, pkeys: impl Into<Vec<u32>>) -> Self {
		self.pkeys = Some(pkeys.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_publish_options_skip_unset() {
		let options = PublishOptions::new().exclude_me(false).exclude(vec![100, 200, 300]);
		let json = serde_json::to_value(&options).unwrap();

		assert_eq!(json, json!({"exclude_me": false, "exclude": [100, 200, 300]}));
	}

	#[test]
	fn test_subscribe_match_renamed() {
		let options = SubscribeOptions::new().match_policy(MatchPolicy::Wildcard);
		let json = serde_json::to_value(&options).unwrap();

		assert_eq!(json, json!({"match": "wildcard"}));
	}
}
