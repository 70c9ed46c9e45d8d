//! Pending request table.
//!
//! Every request this session initiates (PUBLISH with acknowledgement,
//! SUBSCRIBE, UNSUBSCRIBE, CALL, REGISTER, UNREGISTER) is recorded here
//! until exactly one correlated reply arrives or the session closes.
//!
//! # Correlation
//!
//! Entries are keyed by `(RequestKind, Id)`: WAMP scopes request ids per
//! message pair, so a PUBLISHED for id 7 never completes a CALL with id 7.
//!
//! # Completion
//!
//! Each entry owns the sending half of a oneshot channel. Completing an
//! entry consumes it, so a request can be completed at most once. The
//! receiving half is handed to the caller as a [`ReplyFuture`]; dropping
//! that future before completion removes the entry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use wamp_protocol::{Id, Payload, RequestType};

use crate::error::{Error, Result};
use crate::registry::{CallHandler, EventHandler};

/// Kind of a request awaiting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
	Publish,
	Subscribe,
	Unsubscribe,
	Call,
	Register,
	Unregister,
}

impl RequestKind {
	/// Maps the `request_type` of an ERROR message to the pending kind it
	/// answers. INVOCATION errors have no pending counterpart.
	pub fn from_request_type(request_type: RequestType) -> Option<Self> {
		match request_type {
			RequestType::Publish => Some(RequestKind::Publish),
			RequestType::Subscribe => Some(RequestKind::Subscribe),
			RequestType::Unsubscribe => Some(RequestKind::Unsubscribe),
			RequestType::Call => Some(RequestKind::Call),
			RequestType::Register => Some(RequestKind::Register),
			RequestType::Unregister => Some(RequestKind::Unregister),
			RequestType::Invocation => None,
		}
	}
}

impl fmt::Display for RequestKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			RequestKind::Publish => "PUBLISH",
			RequestKind::Subscribe => "SUBSCRIBE",
			RequestKind::Unsubscribe => "UNSUBSCRIBE",
			RequestKind::Call => "CALL",
			RequestKind::Register => "REGISTER",
			RequestKind::Unregister => "UNREGISTER",
		};
		f.write_str(name)
	}
}

/// Successful reply delivered to a pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
	Published(Id),
	Subscribed(Id),
	Unsubscribed,
	Result(Payload),
	Registered(Id),
	Unregistered,
}

/// Request-specific state needed when the reply arrives.
pub(crate) enum RequestContext {
	None,
	/// Handler to install under the subscription id from SUBSCRIBED.
	Subscribe(EventHandler),
	/// Subscription to remove on UNSUBSCRIBED.
	Unsubscribe(Id),
	/// Handler to install under the registration id from REGISTERED.
	Register(CallHandler),
	/// Registration to remove on UNREGISTERED.
	Unregister(Id),
}

type Completion = oneshot::Sender<Result<Reply>>;

/// One in-flight request awaiting a single correlated reply.
pub struct PendingRequest {
	kind: RequestKind,
	id: Id,
	context: RequestContext,
	completion: Completion,
}

impl PendingRequest {
	pub fn kind(&self) -> RequestKind {
		self.kind
	}

	pub fn id(&self) -> Id {
		self.id
	}

	pub(crate) fn take_context(&mut self) -> RequestContext {
		std::mem::replace(&mut self.context, RequestContext::None)
	}

	/// Completes the request successfully.
	pub fn resolve(self, reply: Reply) {
		self.complete(Ok(reply));
	}

	/// Completes the request with a failure.
	pub fn reject(self, error: Error) {
		self.complete(Err(error));
	}

	fn complete(self, outcome: Result<Reply>) {
		if self.completion.send(outcome).is_err() {
			tracing::debug!(kind = %self.kind, id = self.id, "caller abandoned request before completion");
		}
	}
}

impl fmt::Debug for PendingRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingRequest")
			.field("kind", &self.kind)
			.field("id", &self.id)
			.finish()
	}
}

type PendingMap = Arc<Mutex<HashMap<(RequestKind, Id), PendingRequest>>>;

/// Table of requests awaiting a reply.
pub struct PendingTable {
	entries: PendingMap,
	max_pending: usize,
}

impl PendingTable {
	pub fn new(max_pending: usize) -> Self {
		Self {
			entries: Arc::new(Mutex::new(HashMap::new())),
			max_pending,
		}
	}

	/// Records a new pending request and returns the future its reply is
	/// delivered through.
	pub(crate) fn register(
		&self,
		kind: RequestKind,
		id: Id,
		context: RequestContext,
	) -> Result<ReplyFuture> {
		let mut entries = self.entries.lock();

		if entries.contains_key(&(kind, id)) {
			tracing::error!(kind = %kind, id, "request id already pending");
			return Err(Error::DuplicateRequest { kind, id });
		}

		if entries.len() >= self.max_pending {
			tracing::warn!(
				pending = entries.len(),
				max_pending = self.max_pending,
				"too many pending requests; refusing new request"
			);
			return Err(Error::TooManyPending(self.max_pending));
		}

		let (tx, rx) = oneshot::channel();
		entries.insert(
			(kind, id),
			PendingRequest {
				kind,
				id,
				context,
				completion: tx,
			},
		);

		Ok(ReplyFuture {
			rx,
			guard: CancelGuard::new(kind, id, Arc::clone(&self.entries)),
		})
	}

	/// Removes and returns the entry for `(kind, id)`, if pending.
	pub fn take(&self, kind: RequestKind, id: Id) -> Option<PendingRequest> {
		self.entries.lock().remove(&(kind, id))
	}

	/// Removes and resolves the entry. Returns false if nothing was pending.
	pub fn resolve(&self, kind: RequestKind, id: Id, reply: Reply) -> bool {
		match self.take(kind, id) {
			Some(request) => {
				request.resolve(reply);
				true
			}
			None => {
				tracing::warn!(kind = %kind, id, "reply for unknown request dropped");
				false
			}
		}
	}

	/// Removes and rejects the entry. Returns false if nothing was pending.
	pub fn reject(&self, kind: RequestKind, id: Id, error: Error) -> bool {
		match self.take(kind, id) {
			Some(request) => {
				request.reject(error);
				true
			}
			None => {
				tracing::warn!(kind = %kind, id, %error, "error for unknown request dropped");
				false
			}
		}
	}

	/// Fails every pending request with [`Error::Disconnected`].
	///
	/// Returns the number of requests completed.
	pub fn drain(&self, reason: &str) -> usize {
		let drained: Vec<PendingRequest> = self.entries.lock().drain().map(|(_, request)| request).collect();
		let count = drained.len();

		for request in drained {
			request.reject(Error::Disconnected(reason.to_string()));
		}

		if count > 0 {
			tracing::debug!(count, reason, "drained pending requests");
		}
		count
	}

	pub fn contains(&self, kind: RequestKind, id: Id) -> bool {
		self.entries.lock().contains_key(&(kind, id))
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

/// RAII guard removing the pending entry when the reply future is dropped
/// before completion.
struct CancelGuard {
	kind: RequestKind,
	id: Id,
	entries: PendingMap,
	completed: bool,
}

impl CancelGuard {
	fn new(kind: RequestKind, id: Id, entries: PendingMap) -> Self {
		Self {
			kind,
			id,
			entries,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		if self.entries.lock().remove(&(self.kind, self.id)).is_some() {
			tracing::debug!(kind = %self.kind, id = self.id, "CancelGuard: removed abandoned request");
		}
	}
}

/// Future resolving to the reply of one pending request.
pub struct ReplyFuture {
	rx: oneshot::Receiver<Result<Reply>>,
	guard: CancelGuard,
}

impl ReplyFuture {
	pub fn id(&self) -> Id {
		self.guard.id
	}
}

impl Future for ReplyFuture {
	type Output = Result<Reply>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}
