use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wamp_protocol::{
	CallOptions, ErrorMessage, Event, Invocation, Message, Payload, PublishOptions, Published,
	RegisterOptions, Registered, RequestType, ResultMessage, SubscribeOptions, Subscribed, Unsubscribed,
	Yield, uri,
};

use super::*;
use crate::error_registry::{ApplicationError, HandlerError, NotAuthorized};
use crate::transport::{ChannelTransport, PeerEnd, Shutdown};

fn established() -> (Arc<Session>, PeerEnd) {
	established_with(SessionConfig::default())
}

fn established_with(config: SessionConfig) -> (Arc<Session>, PeerEnd) {
	let session = Arc::new(Session::with_config(config));
	let (transport, peer) = ChannelTransport::pair();
	session.on_open(Arc::new(transport));
	(session, peer)
}

async fn next(peer: &mut PeerEnd) -> Message {
	tokio::time::timeout(Duration::from_secs(1), peer.recv())
		.await
		.expect("timed out waiting for outbound message")
		.expect("transport closed")
}

async fn subscribe_with(session: &Arc<Session>, peer: &mut PeerEnd, subscription: Id) -> mpsc::UnboundedReceiver<Payload> {
	let (tx, rx) = mpsc::unbounded_channel();
	let task = tokio::spawn({
		let session = Arc::clone(session);
		async move {
			session
				.subscribe("com.myapp.topic1", SubscribeOptions::new(), move |payload| {
					let tx = tx.clone();
					async move {
						let _ = tx.send(payload);
					}
				})
				.await
		}
	});

	let Message::Subscribe(subscribe) = next(peer).await else {
		panic!("expected SUBSCRIBE");
	};
	session.on_message(Message::Subscribed(Subscribed {
		request: subscribe.request,
		subscription,
	}));
	assert_eq!(task.await.unwrap().unwrap(), subscription);
	rx
}

async fn register_with<F, Fut>(session: &Arc<Session>, peer: &mut PeerEnd, registration: Id, handler: F)
where
	F: Fn(Payload) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = std::result::Result<Payload, HandlerError>> + Send + 'static,
{
	let task = tokio::spawn({
		let session = Arc::clone(session);
		async move {
			session
				.register("com.myapp.myproc1", RegisterOptions::new(), handler)
				.await
		}
	});

	let Message::Register(register) = next(peer).await else {
		panic!("expected REGISTER");
	};
	session.on_message(Message::Registered(Registered {
		request: register.request,
		registration,
	}));
	assert_eq!(task.await.unwrap().unwrap(), registration);
}

#[tokio::test]
async fn test_operations_before_open_fail() {
	let session = Session::new();
	assert_eq!(session.state(), SessionState::Detached);

	let err = session.call("com.myapp.proc", Payload::new(), CallOptions::new()).await.unwrap_err();
	assert!(matches!(err, Error::TransportUnavailable(SessionState::Detached)));

	let err = session
		.publish("com.myapp.topic1", Payload::new(), PublishOptions::new().acknowledge(false))
		.await
		.unwrap_err();
	assert!(err.is_transport_unavailable());
	assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_state_display() {
	assert_eq!(SessionState::Detached.to_string(), "DETACHED");
	assert_eq!(SessionState::Established.to_string(), "ESTABLISHED");
	assert_eq!(SessionState::Closed.to_string(), "CLOSED");
}

#[tokio::test]
async fn test_second_open_ignored() {
	let (session, _peer) = established();
	let (other, _other_peer) = ChannelTransport::pair();

	session.on_open(Arc::new(other));
	assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_call_resolves_single_value() {
	let (session, mut peer) = established();

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("procedure1", Payload::new(), CallOptions::new()).await }
	});

	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};
	assert_eq!(call.procedure, "procedure1");
	assert_eq!(session.pending_count(), 1);

	session.on_message(Message::Result(ResultMessage {
		request: call.request,
		args: vec![json!(100)],
		kwargs: Default::default(),
	}));

	let result = task.await.unwrap().unwrap();
	assert_eq!(result, CallResult::Value(json!(100)));
	assert_eq!(session.pending_count(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_do_not_cross_resolve() {
	let (session, mut peer) = established();

	let first = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.a", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call_a) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	let second = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.b", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call_b) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	assert_ne!(call_a.request, call_b.request);

	session.on_message(Message::Result(ResultMessage {
		request: call_b.request,
		args: vec![json!("b")],
		kwargs: Default::default(),
	}));
	assert_eq!(session.pending_count(), 1);

	session.on_message(Message::Result(ResultMessage {
		request: call_a.request,
		args: vec![json!("a")],
		kwargs: Default::default(),
	}));

	assert_eq!(first.await.unwrap().unwrap(), CallResult::Value(json!("a")));
	assert_eq!(second.await.unwrap().unwrap(), CallResult::Value(json!("b")));
}

#[tokio::test]
async fn test_reply_of_other_kind_does_not_resolve() {
	let (session, mut peer) = established();

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.a", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	// Same id, but PUBLISHED answers a PUBLISH.
	session.on_message(Message::Published(Published {
		request: call.request,
		publication: 7,
	}));
	assert_eq!(session.pending_count(), 1);

	session.on_message(Message::Result(ResultMessage {
		request: call.request,
		args: vec![],
		kwargs: Default::default(),
	}));
	assert_eq!(
		task.await.unwrap().unwrap(),
		CallResult::Structured(CallResults::default())
	);
}

#[tokio::test]
async fn test_error_rejects_with_mapped_kind() {
	let (session, mut peer) = established();
	session.define::<NotAuthorized>(NotAuthorized::URI);

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.secret", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	let mut error = ErrorMessage::new(RequestType::Call, call.request, uri::NOT_AUTHORIZED);
	error.args.push(json!("no access"));
	session.on_message(Message::Error(error));

	let err = task.await.unwrap().unwrap_err();
	let app = err.application().unwrap();
	assert_eq!(app.uri(), uri::NOT_AUTHORIZED);
	assert_eq!(app.args(), &vec![json!("no access")]);
	assert_eq!(app.downcast_ref::<NotAuthorized>().unwrap().message.as_deref(), Some("no access"));
}

#[tokio::test]
async fn test_error_for_unknown_request_dropped() {
	let (session, mut peer) = established();

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.a", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	session.on_message(Message::Error(ErrorMessage::new(
		RequestType::Call,
		call.request + 1000,
		"com.myapp.error",
	)));
	session.on_message(Message::Error(ErrorMessage::new(
		RequestType::Invocation,
		call.request,
		"com.myapp.error",
	)));
	assert_eq!(session.pending_count(), 1);

	session.on_message(Message::Result(ResultMessage {
		request: call.request,
		args: vec![json!(1)],
		kwargs: Default::default(),
	}));
	assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_close_drains_pending_requests() {
	let (session, mut peer) = established();

	let call = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.slow", Payload::new(), CallOptions::new()).await }
	});
	let publish = tokio::spawn({
		let session = Arc::clone(&session);
		async move {
			session
				.publish("com.myapp.topic1", Payload::value("hi"), PublishOptions::new())
				.await
		}
	});

	next(&mut peer).await;
	next(&mut peer).await;
	assert_eq!(session.pending_count(), 2);

	session.close("goodbye");

	assert!(call.await.unwrap().unwrap_err().is_disconnected());
	assert!(publish.await.unwrap().unwrap_err().is_disconnected());
	assert_eq!(session.pending_count(), 0);
	assert_eq!(session.state(), SessionState::Closed);
	assert_eq!(peer.shutdown(), Some(Shutdown::Closed));

	let err = session.call("com.myapp.slow", Payload::new(), CallOptions::new()).await.unwrap_err();
	assert!(matches!(err, Error::TransportUnavailable(SessionState::Closed)));
}

#[tokio::test]
async fn test_close_clears_registries_and_is_idempotent() {
	let (session, mut peer) = established();
	let _events = subscribe_with(&session, &mut peer, 5).await;
	register_with(&session, &mut peer, 6, |_| async { Ok(Payload::new()) }).await;
	assert_eq!(session.subscription_count(), 1);
	assert_eq!(session.registration_count(), 1);

	session.on_close("lost");
	session.on_close("lost again");

	assert_eq!(session.subscription_count(), 0);
	assert_eq!(session.registration_count(), 0);
	assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_abort_discards_queued_messages() {
	let (session, mut peer) = established();
	session
		.publish("com.myapp.topic1", Payload::new(), PublishOptions::new().acknowledge(false))
		.await
		.unwrap();

	session.abort("fatal");

	assert_eq!(peer.shutdown(), Some(Shutdown::Aborted));
	assert!(peer.recv().await.is_none());
	assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_publish_without_acknowledge_resolves_immediately() {
	let (session, mut peer) = established();

	let publication = session
		.publish("com.myapp.topic1", Payload::value("hello"), PublishOptions::new().acknowledge(false))
		.await
		.unwrap();
	assert_eq!(publication, None);
	assert_eq!(session.pending_count(), 0);

	let Message::Publish(publish) = next(&mut peer).await else {
		panic!("expected PUBLISH");
	};
	assert_eq!(publish.options.acknowledge, Some(false));
	assert_eq!(publish.args, vec![json!("hello")]);
}

#[tokio::test]
async fn test_publish_acknowledge_default_from_config() {
	let (session, mut peer) = established_with(SessionConfig::new().acknowledge_publish(false));

	let publication = session
		.publish("com.myapp.topic1", Payload::new(), PublishOptions::new())
		.await
		.unwrap();
	assert_eq!(publication, None);

	let Message::Publish(publish) = next(&mut peer).await else {
		panic!("expected PUBLISH");
	};
	assert_eq!(publish.options.acknowledge, Some(false));
}

#[tokio::test]
async fn test_publish_acknowledged() {
	let (session, mut peer) = established();

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move {
			session
				.publish("com.myapp.topic1", Payload::new(), PublishOptions::new())
				.await
		}
	});

	let Message::Publish(publish) = next(&mut peer).await else {
		panic!("expected PUBLISH");
	};
	assert_eq!(publish.options.acknowledge, Some(true));

	session.on_message(Message::Published(Published {
		request: publish.request,
		publication: 4242,
	}));
	assert_eq!(task.await.unwrap().unwrap(), Some(4242));
}

#[tokio::test]
async fn test_too_many_pending() {
	let (session, mut peer) = established_with(SessionConfig::new().max_pending(1));

	let _held = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.slow", Payload::new(), CallOptions::new()).await }
	});
	next(&mut peer).await;

	let err = session.call("com.myapp.fast", Payload::new(), CallOptions::new()).await.unwrap_err();
	assert!(matches!(err, Error::TooManyPending(1)));
	assert!(peer.try_recv().is_none());
}

#[tokio::test]
async fn test_dropped_call_removes_pending_entry() {
	let (session, mut peer) = established();

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("com.myapp.slow", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};
	assert_eq!(session.pending_count(), 1);

	task.abort();
	let _ = task.await;
	assert_eq!(session.pending_count(), 0);

	// A late reply is dropped.
	session.on_message(Message::Result(ResultMessage {
		request: call.request,
		args: vec![],
		kwargs: Default::default(),
	}));
}

#[tokio::test]
async fn test_event_dispatched_to_handler() {
	let (session, mut peer) = established();
	let mut events = subscribe_with(&session, &mut peer, 5).await;

	session.on_message(Message::Event(Event {
		subscription: 5,
		publication: 1,
		args: vec![json!("hello")],
		kwargs: Default::default(),
	}));

	let payload = tokio::time::timeout(Duration::from_secs(1), events.recv())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(payload.args, vec![json!("hello")]);
}

#[tokio::test]
async fn test_event_for_unknown_subscription_dropped() {
	let (session, mut peer) = established();
	let mut events = subscribe_with(&session, &mut peer, 5).await;

	session.on_message(Message::Event(Event {
		subscription: 6,
		publication: 1,
		args: vec![],
		kwargs: Default::default(),
	}));

	tokio::task::yield_now().await;
	assert!(events.try_recv().is_err());
	assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_unsubscribe_removes_handler_on_confirmation() {
	let (session, mut peer) = established();
	let _events = subscribe_with(&session, &mut peer, 5).await;

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.unsubscribe(5).await }
	});
	let Message::Unsubscribe(unsubscribe) = next(&mut peer).await else {
		panic!("expected UNSUBSCRIBE");
	};
	assert_eq!(unsubscribe.subscription, 5);
	assert_eq!(session.subscription_count(), 1);

	session.on_message(Message::Unsubscribed(Unsubscribed {
		request: unsubscribe.request,
	}));
	task.await.unwrap().unwrap();
	assert_eq!(session.subscription_count(), 0);
}

#[tokio::test]
async fn test_failed_unsubscribe_keeps_handler() {
	let (session, mut peer) = established();
	let _events = subscribe_with(&session, &mut peer, 5).await;

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.unsubscribe(5).await }
	});
	let Message::Unsubscribe(unsubscribe) = next(&mut peer).await else {
		panic!("expected UNSUBSCRIBE");
	};

	session.on_message(Message::Error(ErrorMessage::new(
		RequestType::Unsubscribe,
		unsubscribe.request,
		"wamp.error.no_such_subscription",
	)));

	let err = task.await.unwrap().unwrap_err();
	assert_eq!(err.error_uri(), Some("wamp.error.no_such_subscription"));
	assert_eq!(session.subscription_count(), 1);
}

#[tokio::test]
async fn test_invocation_yields_handler_result() {
	let (session, mut peer) = established();
	register_with(&session, &mut peer, 9, |payload: Payload| async move {
		let x = payload.args.first().and_then(|v| v.as_i64()).unwrap_or(0);
		Ok(Payload::value(x * 2))
	})
	.await;

	session.on_message(Message::Invocation(Invocation {
		request: 77,
		registration: 9,
		args: vec![json!(21)],
		kwargs: Default::default(),
	}));

	assert_eq!(
		next(&mut peer).await,
		Message::Yield(Yield {
			request: 77,
			args: vec![json!(42)],
			kwargs: Default::default(),
		})
	);
	assert_eq!(session.active_invocations(), 0);
}

#[tokio::test]
async fn test_invocation_handler_errors() {
	let (session, mut peer) = established();
	session.define::<NotAuthorized>(NotAuthorized::URI);
	register_with(&session, &mut peer, 9, |payload: Payload| async move {
		match payload.args.first().and_then(|v| v.as_str()) {
			Some("denied") => Err(HandlerError::kind(NotAuthorized {
				message: Some("go away".into()),
				..Default::default()
			})),
			Some("custom") => Err(ApplicationError::new("com.myapp.error.custom").with_kwarg("code", 7).into()),
			_ => Err(HandlerError::other("boom")),
		}
	})
	.await;

	let invoke = |request, arg: &str| {
		Message::Invocation(Invocation {
			request,
			registration: 9,
			args: vec![json!(arg)],
			kwargs: Default::default(),
		})
	};

	session.on_message(invoke(1, "denied"));
	let Message::Error(error) = next(&mut peer).await else {
		panic!("expected ERROR");
	};
	assert_eq!(error.request_type, RequestType::Invocation);
	assert_eq!(error.request, 1);
	assert_eq!(error.error, uri::NOT_AUTHORIZED);
	assert_eq!(error.args, vec![json!("go away")]);

	session.on_message(invoke(2, "custom"));
	let Message::Error(error) = next(&mut peer).await else {
		panic!("expected ERROR");
	};
	assert_eq!(error.error, "com.myapp.error.custom");
	assert_eq!(error.kwargs["code"], 7);

	session.on_message(invoke(3, "other"));
	let Message::Error(error) = next(&mut peer).await else {
		panic!("expected ERROR");
	};
	assert_eq!(error.error, uri::RUNTIME_ERROR);
	assert_eq!(error.args, vec![json!("boom")]);
}

#[tokio::test]
async fn test_invocation_handler_panic_reported() {
	let (session, mut peer) = established();
	register_with(&session, &mut peer, 9, |_payload: Payload| async move {
		if true {
			panic!("handler bug");
		}
		Ok(Payload::new())
	})
	.await;

	session.on_message(Message::Invocation(Invocation {
		request: 5,
		registration: 9,
		args: vec![],
		kwargs: Default::default(),
	}));

	let Message::Error(error) = next(&mut peer).await else {
		panic!("expected ERROR");
	};
	assert_eq!(error.error, uri::RUNTIME_ERROR);
	assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_invocation_for_unknown_registration() {
	let (session, mut peer) = established();

	session.on_message(Message::Invocation(Invocation {
		request: 12,
		registration: 404,
		args: vec![],
		kwargs: Default::default(),
	}));

	assert_eq!(
		next(&mut peer).await,
		Message::Error(ErrorMessage::new(RequestType::Invocation, 12, uri::NO_SUCH_PROCEDURE))
	);
}

#[tokio::test]
async fn test_message_before_open_dropped() {
	let session = Session::new();
	session.on_message(Message::Published(Published {
		request: 1,
		publication: 2,
	}));
	assert_eq!(session.state(), SessionState::Detached);
}

#[tokio::test]
async fn test_run_processes_in_order_and_closes() {
	let (session, mut peer) = established();
	let (tx, rx) = mpsc::unbounded_channel();

	let runner = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.run(rx).await }
	});

	let task = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.call("procedure2", Payload::new(), CallOptions::new()).await }
	});
	let Message::Call(call) = next(&mut peer).await else {
		panic!("expected CALL");
	};

	tx.send(Message::Result(ResultMessage {
		request: call.request,
		args: vec![json!(1), json!(2), json!(3)],
		kwargs: Default::default(),
	}))
	.unwrap();

	let result = task.await.unwrap().unwrap();
	assert_eq!(result.structured().unwrap().results, vec![json!(1), json!(2), json!(3)]);

	drop(tx);
	runner.await.unwrap();
	assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invocation_from_non_runtime_thread_yields() {
	let (session, mut peer) = established();
	register_with(&session, &mut peer, 9, |_payload: Payload| async move { Ok(Payload::value(23)) }).await;

	let remote = Arc::clone(&session);
	std::thread::spawn(move || {
		remote.on_message(Message::Invocation(Invocation {
			request: 77,
			registration: 9,
			args: vec![],
			kwargs: Default::default(),
		}));
	})
	.join()
	.unwrap();

	assert_eq!(
		next(&mut peer).await,
		Message::Yield(Yield {
			request: 77,
			args: vec![json!(23)],
			kwargs: Default::default(),
		})
	);
	assert_eq!(session.active_invocations(), 0);
}

#[test]
fn test_invocation_without_runtime_answers_error() {
	let session = Session::new();
	let (transport, mut peer) = ChannelTransport::pair();
	session.on_open(Arc::new(transport));
	session
		.endpoints
		.registrations
		.add(9, call_handler(|_payload: Payload| async move { Ok(Payload::value(1)) }));

	session.on_message(Message::Invocation(Invocation {
		request: 78,
		registration: 9,
		args: vec![],
		kwargs: Default::default(),
	}));

	let Some(Message::Error(error)) = peer.try_recv() else {
		panic!("expected ERROR");
	};
	assert_eq!(error.request_type, RequestType::Invocation);
	assert_eq!(error.request, 78);
	assert_eq!(error.error, uri::RUNTIME_ERROR);
	assert_eq!(session.active_invocations(), 0);
}

#[test]
fn test_handlers_spawn_on_configured_runtime() {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.enable_all()
		.build()
		.unwrap();
	let session = Session::new().with_runtime(runtime.handle().clone());
	let (transport, mut peer) = ChannelTransport::pair();
	session.on_open(Arc::new(transport));
	session
		.endpoints
		.registrations
		.add(9, call_handler(|_payload: Payload| async move { Ok(Payload::value(5)) }));

	session.on_message(Message::Invocation(Invocation {
		request: 79,
		registration: 9,
		args: vec![],
		kwargs: Default::default(),
	}));

	let reply = runtime.block_on(next(&mut peer));
	assert_eq!(
		reply,
		Message::Yield(Yield {
			request: 79,
			args: vec![json!(5)],
			kwargs: Default::default(),
		})
	);
	assert_eq!(session.active_invocations(), 0);
}
