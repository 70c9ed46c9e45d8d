use wamp_protocol::{Message, Unsubscribe, Unsubscribed};

use super::*;

fn unsubscribe(request: u64) -> Message {
	Message::Unsubscribe(Unsubscribe {
		request,
		subscription: 99,
	})
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
	let (transport, mut peer) = ChannelTransport::pair();

	for request in 1..=3 {
		transport.send(unsubscribe(request)).unwrap();
	}

	for request in 1..=3 {
		assert_eq!(peer.recv().await, Some(unsubscribe(request)));
	}
	assert!(peer.try_recv().is_none());
}

#[tokio::test]
async fn test_close_delivers_queued_then_ends() {
	let (transport, mut peer) = ChannelTransport::pair();
	transport.send(unsubscribe(1)).unwrap();

	transport.close();

	assert!(!transport.is_open());
	assert_eq!(peer.shutdown(), Some(Shutdown::Closed));
	assert_eq!(peer.recv().await, Some(unsubscribe(1)));
	assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_abort_discards_queued() {
	let (transport, mut peer) = ChannelTransport::pair();
	transport.send(unsubscribe(1)).unwrap();

	transport.abort();

	assert_eq!(peer.shutdown(), Some(Shutdown::Aborted));
	assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_send_after_close_fails() {
	let (transport, _peer) = ChannelTransport::pair();
	transport.close();

	let err = transport.send(Message::Unsubscribed(Unsubscribed { request: 1 })).unwrap_err();
	assert!(matches!(err, Error::TransportError(_)));
}

#[tokio::test]
async fn test_dropped_peer_closes_transport() {
	let (transport, peer) = ChannelTransport::pair();
	assert!(transport.is_open());

	drop(peer);

	assert!(!transport.is_open());
	let err = transport.send(unsubscribe(1)).unwrap_err();
	assert!(matches!(err, Error::ChannelClosed));
}

#[tokio::test]
async fn test_close_wakes_blocked_receiver() {
	let (transport, mut peer) = ChannelTransport::pair();

	let reader = tokio::spawn(async move { peer.recv().await });
	tokio::task::yield_now().await;
	transport.close();

	assert_eq!(reader.await.unwrap(), None);
}
