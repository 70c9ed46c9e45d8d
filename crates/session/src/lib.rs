//! WAMP session layer - request correlation, RPC and PubSub dispatch
//!
//! This crate provides the client side of a WAMP session on top of any
//! transport that moves typed [`wamp_protocol::Message`]s:
//!
//! - **Identifiers**: Allocating request ids in the 53-bit WAMP id space
//! - **Pending requests**: Correlating each reply with exactly one waiter
//! - **Endpoints**: Local subscriptions and registrations, and the
//!   invocations currently running on them
//! - **Error registry**: Mapping ERROR URIs to typed application errors
//!   and back
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  application │  publish / subscribe / call / register
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │   Session    │  This crate
//! │  ┌────────┐  │
//! │  │Pending │  │  reply correlation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │Endpts  │  │  EVENT / INVOCATION dispatch
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Errors │  │  URI <-> error kind
//! │  └────────┘  │
//! └──────┬───────┘
//!        │ Transport
//! ┌──────▼───────┐
//! │ serializer + │  not part of this crate
//! │    socket    │
//! └──────────────┘
//! ```

pub mod config;
pub mod error;
pub mod error_registry;
pub mod id;
pub mod pending;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export key types at crate root
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use error_registry::{
	ApplicationError, ErrorFields, ErrorKind, ErrorRegistry, HandlerError, InvalidTopic, NotAuthorized,
};
pub use id::IdGenerator;
pub use pending::{Reply, RequestKind};
pub use registry::{CallHandler, EventHandler};
pub use session::{CallResult, CallResults, Session, SessionState};
pub use transport::{ChannelTransport, PeerEnd, Shutdown, Transport};
pub use wamp_protocol;
