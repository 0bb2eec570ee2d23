// Copyright 2019-2021 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! End-to-end engine behavior over the in-process transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use duplexrpc_core::client::{BatchRequest, Client, ClientBuilder, HttpTransport};
use duplexrpc_core::codec::{memory_pair, Codec};
use duplexrpc_core::server::{CodecOptions, Module, Server};
use duplexrpc_core::types::ErrorObject;
use duplexrpc_core::Error;

struct TestContext {
	pings: AtomicU64,
}

fn test_server() -> Server {
	let mut module = Module::new("test", TestContext { pings: AtomicU64::new(0) }).unwrap();

	module.register_method("echo", |params, _| {
		let (s, n): (String, i64) = params.parse()?;
		Ok(format!("{}:{}", s, n))
	});

	module.register_method("ping", |_, ctx| {
		ctx.pings.fetch_add(1, Ordering::SeqCst);
		Ok(())
	});

	module.register_method("pings", |_, ctx| Ok(ctx.pings.load(Ordering::SeqCst)));

	module.register_method("nothing", |_, _| Ok(None::<u32>));

	module.register_async_method("block", |_, _| async move {
		tokio::time::sleep(Duration::from_secs(600)).await;
		Ok("never")
	});

	// Emits `count` consecutive values starting at `start`, then stops.
	module.register_subscription("counter", |params, notifier, _| {
		let (start, count): (u64, u64) = params.parse()?;
		let sub = notifier.create_subscription();
		let id = sub.id().clone();
		tokio::spawn(async move {
			for value in start..start + count {
				if notifier.notify(&id, &value).is_err() {
					break;
				}
			}
		});
		Ok(sub)
	});

	// Pushes its values inside the subscribe callback itself, i.e. strictly
	// before the subscribe response exists; the activation barrier must
	// queue them.
	module.register_subscription("eager", |params, notifier, _| {
		let values: Vec<u64> = params.one()?;
		let sub = notifier.create_subscription();
		for value in &values {
			notifier.notify(sub.id(), value).map_err(ErrorObject::internal)?;
		}
		Ok(sub)
	});

	// Ticks until unsubscribed or the connection goes away.
	module.register_subscription("ticks", |_, notifier, _| {
		let sub = notifier.create_subscription();
		let mut handle = sub.clone();
		let id = sub.id().clone();
		tokio::spawn(async move {
			let mut tick = 0u64;
			loop {
				tokio::select! {
					_ = handle.canceled() => return,
					_ = tokio::time::sleep(Duration::from_millis(5)) => {
						if notifier.notify(&id, &tick).is_err() {
							return;
						}
						tick += 1;
					}
				}
			}
		});
		Ok(sub)
	});

	let mut server = Server::new();
	server.merge(module);
	server
}

/// Serves a fresh in-process connection and returns a client on it.
fn connect(server: &Server, builder: ClientBuilder) -> Client {
	let (server_codec, client_codec) = memory_pair();
	let server = server.clone();
	tokio::spawn(async move { server.serve_codec(Arc::new(server_codec), CodecOptions::ALL).await });
	builder.build_with_codec(Arc::new(client_codec))
}

#[tokio::test]
async fn echo_call() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());
	let reply: String = client.call("test_echo", ("hi", 7)).await.unwrap();
	assert_eq!(reply, "hi:7");
}

#[tokio::test]
async fn method_not_found() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());
	let err = client.call::<String, _>("nope", ()).await.unwrap_err();
	match err {
		Error::Call(err) => {
			assert_eq!(err.code, -32601);
			assert_eq!(err.message, "the method nope does not exist/is not available");
		}
		other => panic!("expected call error, got {:?}", other),
	}
}

#[tokio::test]
async fn batch_with_mixed_fate() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let mut batch = BatchRequest::new();
	batch.insert("test_echo", ("a", 1)).unwrap();
	batch.insert("bad", ()).unwrap();
	batch.insert("test_echo", ("b", 2)).unwrap();

	let responses = client.batch_call(batch).await.unwrap();
	assert_eq!(responses.len(), 3);
	assert_eq!(responses.decode::<String>(0).unwrap(), "a:1");
	match responses.decode::<String>(1).unwrap_err() {
		Error::Call(err) => assert_eq!(err.code, -32601),
		other => panic!("expected call error, got {:?}", other),
	}
	assert_eq!(responses.decode::<String>(2).unwrap(), "b:2");
}

#[tokio::test]
async fn notification_reaches_the_server() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	client.notify("test_ping", ()).await.unwrap();

	// The notification races the follow-up call; poll until it landed.
	for _ in 0..100 {
		let pings: u64 = client.call("test_pings", ()).await.unwrap();
		if pings == 1 {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("notification never dispatched");
}

#[tokio::test]
async fn null_result_yields_no_result_for_solid_targets() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	assert!(matches!(client.call::<String, _>("test_nothing", ()).await, Err(Error::NoResult)));
	assert_eq!(client.call::<Option<String>, _>("test_nothing", ()).await.unwrap(), None);
}

#[tokio::test]
async fn subscription_happy_path() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let mut sub = client.subscribe::<u64, _>("test", "counter", (0u64, 3u64)).await.unwrap();
	assert!(sub.id().is_valid());
	for expected in 0..3 {
		assert_eq!(sub.next().await, Some(expected));
	}
	// Producer is done but the subscription itself is still open.
	assert!(sub.take_error().is_none());
}

#[tokio::test]
async fn activation_barrier_queues_pre_response_notifications() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let values = vec![10u64, 11, 12];
	let mut sub = client.subscribe::<u64, _>("test", "eager", (values.clone(),)).await.unwrap();
	for expected in values {
		assert_eq!(sub.next().await, Some(expected));
	}
	assert!(sub.take_error().is_none());
}

#[tokio::test]
async fn overflow_drops_the_subscription() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new().max_subscription_buffer(8));

	// One more value than the buffer holds, delivered while the consumer
	// sits idle.
	let mut sub = client.subscribe::<u64, _>("test", "counter", (0u64, 9u64)).await.unwrap();
	tokio::time::sleep(Duration::from_millis(300)).await;

	let mut received = Vec::new();
	while let Some(value) = sub.next().await {
		received.push(value);
	}
	assert_eq!(received, (0..8).collect::<Vec<u64>>());
	assert!(matches!(sub.take_error(), Some(Error::SubscriptionQueueOverflow)));
	assert!(sub.take_error().is_none());
}

#[tokio::test]
async fn unsubscribe_stops_the_server_side() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let mut sub = client.subscribe::<u64, _>("test", "ticks", ()).await.unwrap();
	assert!(sub.next().await.is_some());
	sub.unsubscribe().await;

	// The connection stays usable afterwards.
	let reply: String = client.call("test_echo", ("after", 1)).await.unwrap();
	assert_eq!(reply, "after:1");
}

#[tokio::test]
async fn connection_loss_fires_subscription_error() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let mut sub = client.subscribe::<u64, _>("test", "ticks", ()).await.unwrap();
	assert!(sub.next().await.is_some());

	server.stop();

	while sub.next().await.is_some() {}
	assert!(matches!(sub.take_error(), Some(Error::Transport(_))));
}

#[tokio::test]
async fn close_mid_call_returns_client_quit() {
	let server = test_server();
	let client = Arc::new(connect(&server, ClientBuilder::new()));

	let caller = {
		let client = client.clone();
		tokio::spawn(async move { client.call::<String, _>("test_block", ()).await })
	};
	tokio::time::sleep(Duration::from_millis(50)).await;
	client.close();

	let result = tokio::time::timeout(Duration::from_secs(2), caller).await.unwrap().unwrap();
	assert!(matches!(result, Err(Error::ClientQuit)));
}

#[tokio::test]
async fn deliberate_close_ends_subscriptions_without_error() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());

	let mut sub = client.subscribe::<u64, _>("test", "ticks", ()).await.unwrap();
	assert!(sub.next().await.is_some());
	client.close();

	while sub.next().await.is_some() {}
	assert!(sub.take_error().is_none());
}

#[tokio::test]
async fn call_times_out() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new().request_timeout(Duration::from_millis(50)));
	assert!(matches!(client.call::<String, _>("test_block", ()).await, Err(Error::RequestTimeout)));
}

#[tokio::test]
async fn subscribing_to_an_unknown_name_fails() {
	let server = test_server();
	let client = connect(&server, ClientBuilder::new());
	let err = client.subscribe::<u64, _>("test", "nope", ()).await.unwrap_err();
	match err {
		Error::Call(err) => {
			assert_eq!(err.code, -32000);
			assert_eq!(err.message, r#"no "nope" subscription in test namespace"#);
		}
		other => panic!("expected call error, got {:?}", other),
	}
}

// Reconnecting dial: the first connection dies, the next op dials again.
#[tokio::test]
async fn redial_after_connection_loss() {
	let server = test_server();
	let attempts = Arc::new(AtomicU64::new(0));
	let live_server_codec: Arc<Mutex<Option<Arc<dyn Codec>>>> = Arc::new(Mutex::new(None));

	let dial = {
		let server = server.clone();
		let attempts = attempts.clone();
		let live = live_server_codec.clone();
		Box::new(move || -> BoxFuture<'static, Result<Arc<dyn Codec>, Error>> {
			let server = server.clone();
			let attempts = attempts.clone();
			let live = live.clone();
			async move {
				attempts.fetch_add(1, Ordering::SeqCst);
				let (server_codec, client_codec) = memory_pair();
				let server_codec: Arc<dyn Codec> = Arc::new(server_codec);
				*live.lock() = Some(server_codec.clone());
				tokio::spawn(async move { server.serve_codec(server_codec, CodecOptions::ALL).await });
				Ok(Arc::new(client_codec) as Arc<dyn Codec>)
			}
			.boxed()
		})
	};
	let client = ClientBuilder::new().build_with_dial(dial);

	let reply: String = client.call("test_echo", ("first", 1)).await.unwrap();
	assert_eq!(reply, "first:1");
	assert_eq!(attempts.load(Ordering::SeqCst), 1);

	// Kill the live connection and give the reader a moment to notice.
	live_server_codec.lock().as_ref().unwrap().close();
	tokio::time::sleep(Duration::from_millis(50)).await;

	let reply: String = client.call("test_echo", ("second", 2)).await.unwrap();
	assert_eq!(reply, "second:2");
	assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// HTTP mode: same wire protocol, degraded surface.
#[derive(Debug)]
struct InProcessHttp(Server);

#[async_trait]
impl HttpTransport for InProcessHttp {
	async fn post(&self, body: String) -> Result<String, Error> {
		Ok(self.0.raw_json_request(&body).await.unwrap_or_default())
	}
}

#[tokio::test]
async fn http_fast_path() {
	let server = test_server();
	let client = ClientBuilder::new().build_with_http(Arc::new(InProcessHttp(server)));

	let reply: String = client.call("test_echo", ("hi", 7)).await.unwrap();
	assert_eq!(reply, "hi:7");

	let mut batch = BatchRequest::new();
	batch.insert("test_echo", ("a", 1)).unwrap();
	batch.insert("bad", ()).unwrap();
	let responses = client.batch_call(batch).await.unwrap();
	assert_eq!(responses.decode::<String>(0).unwrap(), "a:1");
	assert!(matches!(responses.decode::<String>(1), Err(Error::Call(_))));

	client.notify("test_ping", ()).await.unwrap();

	assert!(matches!(
		client.subscribe::<u64, _>("test", "counter", (0u64, 1u64)).await,
		Err(Error::NotificationsUnsupported)
	));
}
