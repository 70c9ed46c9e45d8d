//! Endpoint registries.
//!
//! Local subscriptions (subscription id -> event handler), local
//! registrations (registration id -> call handler), and the invocations
//! currently being answered by a local handler.
//!
//! Uses [`DashMap`] so spawned handler tasks can retire their invocation
//! without going through the session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use wamp_protocol::{Id, Payload};

use crate::error_registry::HandlerError;

/// Boxed future returned by an event handler.
pub type EventFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Event handler: payload -> async `()`.
pub type EventHandler = Arc<dyn Fn(Payload) -> EventFuture + Send + Sync>;

/// Boxed future returned by a call handler.
pub type InvocationFuture = Pin<Box<dyn Future<Output = Result<Payload, HandlerError>> + Send>>;

/// Call handler: payload -> async result payload or handler error.
pub type CallHandler = Arc<dyn Fn(Payload) -> InvocationFuture + Send + Sync>;

/// Wraps an async closure into an [`EventHandler`].
pub fn event_handler<F, Fut>(handler: F) -> EventHandler
where
	F: Fn(Payload) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	Arc::new(move |payload: Payload| -> EventFuture { Box::pin(handler(payload)) })
}

/// Wraps an async closure into a [`CallHandler`].
pub fn call_handler<F, Fut>(handler: F) -> CallHandler
where
	F: Fn(Payload) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Payload, HandlerError>> + Send + 'static,
{
	Arc::new(move |payload: Payload| -> InvocationFuture { Box::pin(handler(payload)) })
}

/// Handlers keyed by the id the peer assigned.
pub struct HandlerRegistry<H> {
	handlers: DashMap<Id, H>,
}

impl<H: Clone> Default for HandlerRegistry<H> {
	fn default() -> Self {
		Self::new()
	}
}

impl<H: Clone> HandlerRegistry<H> {
	pub fn new() -> Self {
		Self {
			handlers: DashMap::new(),
		}
	}

	/// Installs a handler, replacing any handler already under `id`.
	pub fn add(&self, id: Id, handler: H) {
		if self.handlers.insert(id, handler).is_some() {
			tracing::warn!(id, "peer reused an active endpoint id; handler replaced");
		}
	}

	pub fn remove(&self, id: Id) -> Option<H> {
		self.handlers.remove(&id).map(|(_, handler)| handler)
	}

	pub fn lookup(&self, id: Id) -> Option<H> {
		self.handlers.get(&id).map(|entry| entry.value().clone())
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}

	pub fn clear(&self) {
		self.handlers.clear();
	}
}

/// Invocations received from the peer whose YIELD/ERROR is not sent yet.
///
/// Maps invocation id to the registration it targets.
#[derive(Default)]
pub struct InvocationTable {
	active: DashMap<Id, Id>,
}

impl InvocationTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an invocation. Returns false if the id is already active.
	pub fn begin(&self, invocation: Id, registration: Id) -> bool {
		match self.active.entry(invocation) {
			dashmap::mapref::entry::Entry::Occupied(_) => false,
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(registration);
				true
			}
		}
	}

	/// Retires an invocation. Returns false if it was no longer active
	/// (the session closed in the meantime).
	pub fn finish(&self, invocation: Id) -> bool {
		self.active.remove(&invocation).is_some()
	}

	pub fn is_active(&self, invocation: Id) -> bool {
		self.active.contains_key(&invocation)
	}

	pub fn len(&self) -> usize {
		self.active.len()
	}

	pub fn is_empty(&self) -> bool {
		self.active.is_empty()
	}

	pub fn clear(&self) {
		self.active.clear();
	}
}

/// All endpoint state owned by a session.
#[derive(Default)]
pub struct Endpoints {
	pub subscriptions: HandlerRegistry<EventHandler>,
	pub registrations: HandlerRegistry<CallHandler>,
	pub invocations: InvocationTable,
}

impl Endpoints {
	pub fn new() -> Self {
		Self::default()
	}

	/// Forgets every subscription, registration and active invocation.
	pub fn clear(&self) {
		self.subscriptions.clear();
		self.registrations.clear();
		self.invocations.clear();
	}
}
