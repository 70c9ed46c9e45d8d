//! Wire records for the WAMP session layer.
//!
//! This crate contains the typed message records exchanged between a WAMP
//! client session and its peer (router). These types represent the
//! "protocol layer" - the shapes of messages as the serializer produces and
//! consumes them. Framing and byte-level encoding live elsewhere.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond construction and serialization
//! - **Closed**: [`Message`] is an exhaustive enum over the WAMP message set
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Correlation, dispatch and error mapping are built on top of these types
//! in `wamp-session`.

pub mod message;
pub mod options;
pub mod types;
pub mod uri;

pub use message::*;
pub use options::*;
pub use types::*;
