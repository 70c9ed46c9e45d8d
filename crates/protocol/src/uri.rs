//! Well-known WAMP error URIs.

/// The called procedure has no registration.
pub const NO_SUCH_PROCEDURE: &str = "wamp.error.no_such_procedure";

/// The topic of a publish or subscribe is not a valid URI.
pub const INVALID_TOPIC: &str = "wamp.error.invalid_topic";

/// The peer refused the action for the current session.
pub const NOT_AUTHORIZED: &str = "wamp.error.not_authorized";

/// A callee failed with an error that has no application URI.
pub const RUNTIME_ERROR: &str = "wamp.error.runtime_error";
