//! Transport boundary.
//!
//! The session never sees bytes or frames: it hands typed [`Message`]s to a
//! [`Transport`] and receives typed messages through
//! [`Session::on_message`](crate::Session::on_message) or
//! [`Session::run`](crate::Session::run).
//!
//! [`ChannelTransport`] is an in-memory implementation backed by an
//! unbounded mpsc channel. Sends are queued in call order, so concurrent
//! callers never interleave partial writes. The receiving [`PeerEnd`] is
//! drained by whatever sits on the other side (a serializer + socket
//! writer task, or a mock router in tests).

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use wamp_protocol::Message;

use crate::error::{Error, Result};

/// Outbound side of a message transport.
pub trait Transport: Send + Sync {
	/// Queues a message for the peer.
	fn send(&self, message: Message) -> Result<()>;

	/// Returns true while messages can still be sent.
	fn is_open(&self) -> bool;

	/// Closes the transport gracefully.
	fn close(&self);

	/// Tears the transport down immediately.
	fn abort(&self);
}

/// How a [`ChannelTransport`] was shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Closed,
	Aborted,
}

struct Shared {
	/// Dropped on close/abort so the peer end observes end-of-stream.
	tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
	aborted: AtomicBool,
}

/// In-memory transport that forwards messages over an mpsc channel.
#[derive(Clone)]
pub struct ChannelTransport {
	shared: Arc<Shared>,
}

/// Receiving end of a [`ChannelTransport`].
pub struct PeerEnd {
	rx: mpsc::UnboundedReceiver<Message>,
	shared: Arc<Shared>,
}

impl ChannelTransport {
	/// Creates a transport and the peer end that receives its messages.
	pub fn pair() -> (Self, PeerEnd) {
		let (tx, rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			tx: Mutex::new(Some(tx)),
			aborted: AtomicBool::new(false),
		});

		(
			Self {
				shared: Arc::clone(&shared),
			},
			PeerEnd { rx, shared },
		)
	}
}

impl Transport for ChannelTransport {
	fn send(&self, message: Message) -> Result<()> {
		let tx = self.shared.tx.lock();
		let Some(tx) = tx.as_ref() else {
			return Err(Error::TransportError("transport is closed".to_string()));
		};

		tracing::trace!(code = message.code(), kind = message.name(), "queueing outbound message");

		tx.send(message).map_err(|_| {
			tracing::error!("Failed to queue message: peer end dropped");
			Error::ChannelClosed
		})
	}

	fn is_open(&self) -> bool {
		self.shared.tx.lock().as_ref().is_some_and(|tx| !tx.is_closed())
	}

	fn close(&self) {
		if self.shared.tx.lock().take().is_some() {
			tracing::debug!("channel transport closed");
		}
	}

	fn abort(&self) {
		self.shared.aborted.store(true, Ordering::SeqCst);
		if self.shared.tx.lock().take().is_some() {
			tracing::debug!("channel transport aborted");
		}
	}
}

impl PeerEnd {
	/// Receives the next message.
	///
	/// After a close, already queued messages are still delivered before
	/// `None`; after an abort, `None` is returned right away.
	pub async fn recv(&mut self) -> Option<Message> {
		let message = self.rx.recv().await;
		if self.shared.aborted.load(Ordering::SeqCst) {
			return None;
		}
		message
	}

	/// Receives a message if one is already queued.
	pub fn try_recv(&mut self) -> Option<Message> {
		if self.shared.aborted.load(Ordering::SeqCst) {
			return None;
		}
		self.rx.try_recv().ok()
	}

	/// How the transport was shut down, if it was.
	pub fn shutdown(&self) -> Option<Shutdown> {
		if self.shared.aborted.load(Ordering::SeqCst) {
			Some(Shutdown::Aborted)
		} else if self.shared.tx.lock().is_none() {
			Some(Shutdown::Closed)
		} else {
			None
		}
	}
}
