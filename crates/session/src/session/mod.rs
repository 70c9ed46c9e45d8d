//! WAMP session state machine.
//!
//! This module turns a message transport into typed RPC and PubSub
//! operations. It handles:
//! - Allocating request ids
//! - Correlating PUBLISHED/SUBSCRIBED/.../RESULT/ERROR replies with
//!   pending requests
//! - Dispatching EVENT and INVOCATION messages to local handlers
//! - Mapping ERROR URIs to application error kinds
//!
//! # Message Flow
//!
//! 1. Caller invokes `publish`/`subscribe`/`call`/...
//! 2. Session allocates an id and records a pending entry
//! 3. The request is sent via the transport
//! 4. Caller awaits the reply future
//! 5. The peer's reply reaches [`Session::on_message`]
//! 6. The pending entry is removed and completed
//! 7. Caller receives the result
//!
//! Incoming messages are processed one at a time, in arrival order.
//! Handlers run as spawned tasks so a slow handler never holds up reply
//! routing. [`Session::on_message`] takes no lock across a send, so a
//! transport may deliver replies synchronously from inside `send`.

mod call_result;
#[cfg(test)]
mod tests;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use wamp_protocol::{
	Call, CallOptions, ErrorMessage, Event, Id, Invocation, Message, Payload, Publish, PublishOptions,
	Register, RegisterOptions, RequestType, Subscribe, SubscribeOptions, Unregister, Unsubscribe, Yield,
	uri,
};

pub use call_result::{CallResult, CallResults};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::error_registry::{ErrorKind, ErrorRegistry, HandlerError};
use crate::id::IdGenerator;
use crate::pending::{PendingTable, Reply, ReplyFuture, RequestContext, RequestKind};
use crate::registry::{Endpoints, call_handler, event_handler};
use crate::transport::Transport;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Constructed, no transport attached yet.
	Detached,
	/// Transport attached; operations allowed.
	Established,
	/// Terminal.
	Closed,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionState::Detached => "DETACHED",
			SessionState::Established => "ESTABLISHED",
			SessionState::Closed => "CLOSED",
		};
		f.write_str(name)
	}
}

enum Link {
	Detached,
	Established(Arc<dyn Transport>),
	Closed,
}

impl Link {
	fn state(&self) -> SessionState {
		match self {
			Link::Detached => SessionState::Detached,
			Link::Established(_) => SessionState::Established,
			Link::Closed => SessionState::Closed,
		}
	}
}

/// Client side of one WAMP session.
pub struct Session {
	config: SessionConfig,
	ids: IdGenerator,
	pending: PendingTable,
	endpoints: Arc<Endpoints>,
	errors: Arc<ErrorRegistry>,
	link: Mutex<Link>,
	/// Runtime handlers are spawned on, captured at construction or open.
	runtime: Mutex<Option<Handle>>,
}

impl Default for Session {
	fn default() -> Self {
		Self::new()
	}
}

impl Session {
	/// Creates a detached session with default configuration.
	pub fn new() -> Self {
		Self::with_config(SessionConfig::default())
	}

	pub fn with_config(config: SessionConfig) -> Self {
		Self {
			pending: PendingTable::new(config.max_pending),
			config,
			ids: IdGenerator::new(),
			endpoints: Arc::new(Endpoints::new()),
			errors: Arc::new(ErrorRegistry::new()),
			link: Mutex::new(Link::Detached),
			runtime: Mutex::new(Handle::try_current().ok()),
		}
	}

	/// Sets the runtime EVENT and INVOCATION handlers are spawned on.
	///
	/// Needed only when the session is created and opened outside a tokio
	/// runtime but receives messages on a thread that is not a runtime
	/// thread either.
	pub fn with_runtime(self, handle: Handle) -> Self {
		*self.runtime.lock() = Some(handle);
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn state(&self) -> SessionState {
		self.link.lock().state()
	}

	/// Maps ERROR messages carrying `uri` to error kind `K`.
	pub fn define<K: ErrorKind>(&self, uri: impl Into<String>) {
		self.errors.define::<K>(uri);
	}

	pub fn errors(&self) -> &ErrorRegistry {
		&self.errors
	}

	/// Number of requests awaiting a reply.
	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	pub fn subscription_count(&self) -> usize {
		self.endpoints.subscriptions.len()
	}

	pub fn registration_count(&self) -> usize {
		self.endpoints.registrations.len()
	}

	/// Number of invocations whose handler has not finished yet.
	pub fn active_invocations(&self) -> usize {
		self.endpoints.invocations.len()
	}

	/// Attaches the transport: DETACHED -> ESTABLISHED.
	pub fn on_open(&self, transport: Arc<dyn Transport>) {
		if let Ok(handle) = Handle::try_current() {
			let mut runtime = self.runtime.lock();
			if runtime.is_none() {
				*runtime = Some(handle);
			}
		}

		let mut link = self.link.lock();
		match &*link {
			Link::Detached => {
				*link = Link::Established(transport);
				tracing::info!("session established");
			}
			other => {
				tracing::warn!(state = %other.state(), "on_open ignored: session is not detached");
			}
		}
	}

	fn transport(&self) -> Result<Arc<dyn Transport>> {
		match &*self.link.lock() {
			Link::Established(transport) => Ok(Arc::clone(transport)),
			other => Err(Error::TransportUnavailable(other.state())),
		}
	}

	/// Allocates an id, records the pending entry and sends the request.
	fn request(
		&self,
		kind: RequestKind,
		context: RequestContext,
		build: impl FnOnce(Id) -> Message,
	) -> Result<ReplyFuture> {
		// Registered under the link lock so a concurrent close either
		// rejects this request up front or drains it.
		let (transport, reply) = {
			let link = self.link.lock();
			let Link::Established(transport) = &*link else {
				return Err(Error::TransportUnavailable(link.state()));
			};
			let id = self.ids.next();
			let reply = self.pending.register(kind, id, context)?;
			(Arc::clone(transport), reply)
		};

		let message = build(reply.id());
		tracing::debug!(kind = %kind, id = reply.id(), "sending request");

		// Dropping `reply` on failure removes the pending entry.
		transport.send(message)?;
		Ok(reply)
	}

	/// Publishes to `topic`.
	///
	/// Resolves to the publication id once the broker acknowledges. When
	/// acknowledgement is off (via `options.acknowledge` or, if unset, the
	/// session config) the publication is only sent and `None` is returned
	/// immediately.
	pub async fn publish(&self, topic: &str, payload: Payload, options: PublishOptions) -> Result<Option<Id>> {
		let acknowledge = options.acknowledge.unwrap_or(self.config.acknowledge_publish);
		let (args, kwargs) = payload.into_parts();
		let publish = |request| {
			Message::Publish(Publish {
				request,
				options: PublishOptions {
					acknowledge: Some(acknowledge),
					..options
				},
				topic: topic.to_string(),
				args,
				kwargs,
			})
		};

		if !acknowledge {
			let transport = self.transport()?;
			transport.send(publish(self.ids.next()))?;
			return Ok(None);
		}

		match self.request(RequestKind::Publish, RequestContext::None, publish)?.await? {
			Reply::Published(publication) => Ok(Some(publication)),
			other => Err(unexpected_reply(RequestKind::Publish, &other)),
		}
	}

	/// Subscribes `handler` to `topic`. Resolves to the subscription id.
	pub async fn subscribe<F, Fut>(&self, topic: &str, options: SubscribeOptions, handler: F) -> Result<Id>
	where
		F: Fn(Payload) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let context = RequestContext::Subscribe(event_handler(handler));
		let reply = self.request(RequestKind::Subscribe, context, |request| {
			Message::Subscribe(Subscribe {
				request,
				options,
				topic: topic.to_string(),
			})
		})?;

		match reply.await? {
			Reply::Subscribed(subscription) => Ok(subscription),
			other => Err(unexpected_reply(RequestKind::Subscribe, &other)),
		}
	}

	/// Drops a subscription. The local handler is removed only once the
	/// broker confirms.
	pub async fn unsubscribe(&self, subscription: Id) -> Result<()> {
		let context = RequestContext::Unsubscribe(subscription);
		let reply = self.request(RequestKind::Unsubscribe, context, |request| {
			Message::Unsubscribe(Unsubscribe { request, subscription })
		})?;

		match reply.await? {
			Reply::Unsubscribed => Ok(()),
			other => Err(unexpected_reply(RequestKind::Unsubscribe, &other)),
		}
	}

	/// Calls `procedure`.
	pub async fn call(&self, procedure: &str, payload: Payload, options: CallOptions) -> Result<CallResult> {
		let (args, kwargs) = payload.into_parts();
		let reply = self.request(RequestKind::Call, RequestContext::None, |request| {
			Message::Call(Call {
				request,
				options,
				procedure: procedure.to_string(),
				args,
				kwargs,
			})
		})?;

		match reply.await? {
			Reply::Result(payload) => Ok(CallResult::from_payload(payload)),
			other => Err(unexpected_reply(RequestKind::Call, &other)),
		}
	}

	/// Registers `handler` for `procedure`. Resolves to the registration id.
	pub async fn register<F, Fut>(&self, procedure: &str, options: RegisterOptions, handler: F) -> Result<Id>
	where
		F: Fn(Payload) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<Payload, HandlerError>> + Send + 'static,
	{
		let context = RequestContext::Register(call_handler(handler));
		let reply = self.request(RequestKind::Register, context, |request| {
			Message::Register(Register {
				request,
				options,
				procedure: procedure.to_string(),
			})
		})?;

		match reply.await? {
			Reply::Registered(registration) => Ok(registration),
			other => Err(unexpected_reply(RequestKind::Register, &other)),
		}
	}

	/// Withdraws a registration. The local handler is removed only once the
	/// dealer confirms.
	pub async fn unregister(&self, registration: Id) -> Result<()> {
		let context = RequestContext::Unregister(registration);
		let reply = self.request(RequestKind::Unregister, context, |request| {
			Message::Unregister(Unregister { request, registration })
		})?;

		match reply.await? {
			Reply::Unregistered => Ok(()),
			other => Err(unexpected_reply(RequestKind::Unregister, &other)),
		}
	}

	/// Processes one incoming message.
	pub fn on_message(&self, message: Message) {
		tracing::debug!(code = message.code(), kind = message.name(), "received message");

		let state = self.state();
		if state != SessionState::Established {
			tracing::warn!(kind = message.name(), %state, "message received outside an established session; dropped");
			return;
		}

		match message {
			Message::Published(published) => {
				self.pending
					.resolve(RequestKind::Publish, published.request, Reply::Published(published.publication));
			}
			Message::Subscribed(subscribed) => {
				let Some(mut request) = self.pending.take(RequestKind::Subscribe, subscribed.request) else {
					tracing::warn!(id = subscribed.request, subscription = subscribed.subscription, "SUBSCRIBED for unknown request dropped");
					return;
				};
				if let RequestContext::Subscribe(handler) = request.take_context() {
					self.endpoints.subscriptions.add(subscribed.subscription, handler);
				}
				request.resolve(Reply::Subscribed(subscribed.subscription));
			}
			Message::Unsubscribed(unsubscribed) => {
				let Some(mut request) = self.pending.take(RequestKind::Unsubscribe, unsubscribed.request) else {
					tracing::warn!(id = unsubscribed.request, "UNSUBSCRIBED for unknown request dropped");
					return;
				};
				if let RequestContext::Unsubscribe(subscription) = request.take_context() {
					self.endpoints.subscriptions.remove(subscription);
				}
				request.resolve(Reply::Unsubscribed);
			}
			Message::Result(result) => {
				let payload = Payload::from_parts(result.args, result.kwargs);
				self.pending.resolve(RequestKind::Call, result.request, Reply::Result(payload));
			}
			Message::Registered(registered) => {
				let Some(mut request) = self.pending.take(RequestKind::Register, registered.request) else {
					tracing::warn!(id = registered.request, registration = registered.registration, "REGISTERED for unknown request dropped");
					return;
				};
				if let RequestContext::Register(handler) = request.take_context() {
					self.endpoints.registrations.add(registered.registration, handler);
				}
				request.resolve(Reply::Registered(registered.registration));
			}
			Message::Unregistered(unregistered) => {
				let Some(mut request) = self.pending.take(RequestKind::Unregister, unregistered.request) else {
					tracing::warn!(id = unregistered.request, "UNREGISTERED for unknown request dropped");
					return;
				};
				if let RequestContext::Unregister(registration) = request.take_context() {
					self.endpoints.registrations.remove(registration);
				}
				request.resolve(Reply::Unregistered);
			}
			Message::Error(error) => self.on_error(error),
			Message::Event(event) => self.on_event(event),
			Message::Invocation(invocation) => self.on_invocation(invocation),
			unexpected @ (Message::Publish(_)
			| Message::Subscribe(_)
			| Message::Unsubscribe(_)
			| Message::Call(_)
			| Message::Register(_)
			| Message::Unregister(_)
			| Message::Yield(_)) => {
				tracing::warn!(kind = unexpected.name(), "peer sent a client-to-router message; dropped");
			}
		}
	}

	fn on_error(&self, error: ErrorMessage) {
		let Some(kind) = RequestKind::from_request_type(error.request_type) else {
			tracing::warn!(id = error.request, uri = %error.error, "ERROR for an invocation received; dropped");
			return;
		};

		if !self.pending.contains(kind, error.request) {
			tracing::warn!(kind = %kind, id = error.request, uri = %error.error, "ERROR for unknown request dropped");
			return;
		}

		let failure = self.errors.to_error(&error.error, error.args, error.kwargs);
		self.pending.reject(kind, error.request, Error::Application(failure));
	}

	fn on_event(&self, event: Event) {
		let Some(handler) = self.endpoints.subscriptions.lookup(event.subscription) else {
			tracing::debug!(
				subscription = event.subscription,
				publication = event.publication,
				"EVENT for unknown subscription dropped"
			);
			return;
		};

		let subscription = event.subscription;
		let payload = Payload::from_parts(event.args, event.kwargs);
		let spawned = self.spawn_handler(async move {
			if AssertUnwindSafe(async move { handler(payload).await })
				.catch_unwind()
				.await
				.is_err()
			{
				tracing::error!(subscription, "event handler panicked");
			}
		});
		if !spawned {
			tracing::error!(subscription, "EVENT dropped: no runtime to run its handler");
		}
	}

	fn on_invocation(&self, invocation: Invocation) {
		let Invocation {
			request,
			registration,
			args,
			kwargs,
		} = invocation;

		let transport = match self.transport() {
			Ok(transport) => transport,
			Err(err) => {
				tracing::warn!(request, %err, "INVOCATION dropped");
				return;
			}
		};

		let Some(handler) = self.endpoints.registrations.lookup(registration) else {
			tracing::warn!(request, registration, "INVOCATION for unknown registration");
			let reply = ErrorMessage::new(RequestType::Invocation, request, uri::NO_SUCH_PROCEDURE);
			if let Err(err) = transport.send(Message::Error(reply)) {
				tracing::error!(request, %err, "failed to send ERROR for invocation");
			}
			return;
		};

		if !self.endpoints.invocations.begin(request, registration) {
			tracing::warn!(request, registration, "duplicate INVOCATION id dropped");
			return;
		}

		let endpoints = Arc::clone(&self.endpoints);
		let errors = Arc::clone(&self.errors);
		let payload = Payload::from_parts(args, kwargs);
		let replier = Arc::clone(&transport);

		let spawned = self.spawn_handler(async move {
			let outcome = AssertUnwindSafe(async move { handler(payload).await })
				.catch_unwind()
				.await;

			let message = match outcome {
				Ok(Ok(result)) => {
					let (args, kwargs) = result.into_parts();
					Message::Yield(Yield { request, args, kwargs })
				}
				Ok(Err(err)) => {
					tracing::debug!(request, registration, %err, "invocation handler failed");
					let (error, payload) = errors.to_wire(&err);
					let (args, kwargs) = payload.into_parts();
					Message::Error(ErrorMessage {
						request_type: RequestType::Invocation,
						request,
						error,
						args,
						kwargs,
					})
				}
				Err(_) => {
					tracing::error!(request, registration, "invocation handler panicked");
					let mut reply = ErrorMessage::new(RequestType::Invocation, request, uri::RUNTIME_ERROR);
					reply.args.push("invocation handler panicked".into());
					Message::Error(reply)
				}
			};

			if !endpoints.invocations.finish(request) {
				tracing::debug!(request, "session closed before invocation finished; reply dropped");
				return;
			}

			if let Err(err) = transport.send(message) {
				tracing::error!(request, %err, "failed to send invocation reply");
			}
		});

		if !spawned {
			self.endpoints.invocations.finish(request);
			let mut reply = ErrorMessage::new(RequestType::Invocation, request, uri::RUNTIME_ERROR);
			reply.args.push("no runtime available to run the invocation handler".into());
			if let Err(err) = replier.send(Message::Error(reply)) {
				tracing::error!(request, %err, "failed to send ERROR for invocation");
			}
		}
	}

	/// Spawns a handler task on the session's runtime, falling back to the
	/// caller's. Returns false if neither exists.
	fn spawn_handler<F>(&self, task: F) -> bool
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let handle = self.runtime.lock().clone().or_else(|| Handle::try_current().ok());
		match handle {
			Some(handle) => {
				handle.spawn(task);
				true
			}
			None => {
				tracing::error!("no tokio runtime available; handler not run");
				false
			}
		}
	}

	/// Tears the session down: CLOSED, every pending request fails with
	/// [`Error::Disconnected`], and both registries are cleared.
	pub fn on_close(&self, reason: &str) {
		let previous = std::mem::replace(&mut *self.link.lock(), Link::Closed);
		if matches!(previous, Link::Closed) {
			tracing::debug!(reason, "on_close ignored: session already closed");
			return;
		}

		let drained = self.pending.drain(reason);
		self.endpoints.clear();
		tracing::info!(reason, drained, "session closed");
	}

	/// Closes the transport and the session.
	pub fn close(&self, reason: &str) {
		if let Ok(transport) = self.transport() {
			transport.close();
		}
		self.on_close(reason);
	}

	/// Aborts the transport and closes the session.
	pub fn abort(&self, reason: &str) {
		if let Ok(transport) = self.transport() {
			transport.abort();
		}
		self.on_close(reason);
	}

	/// Runs the inbound message loop.
	///
	/// Messages are processed strictly in arrival order. When `incoming`
	/// ends the session is closed.
	pub async fn run(&self, mut incoming: mpsc::UnboundedReceiver<Message>) {
		while let Some(message) = incoming.recv().await {
			self.on_message(message);
			if self.state() == SessionState::Closed {
				break;
			}
		}

		self.on_close("transport closed");
	}
}

fn unexpected_reply(kind: RequestKind, reply: &Reply) -> Error {
	Error::ProtocolError(format!("unexpected reply to {kind}: {reply:?}"))
}
