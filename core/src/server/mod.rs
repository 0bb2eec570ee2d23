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

//! Server: holds the registered services and runs one dispatcher per codec.

mod handler;
/// Outbound sink shared by responses and notifications.
pub mod helpers;
/// Service registration.
pub mod module;
/// Server-pushed subscriptions.
pub mod notifier;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use duplexrpc_types::{ErrorObject, Message};

use crate::codec::{Codec, CodecError, Incoming, OneShotCodec};

use handler::Dispatched;
use helpers::SinkCommand;

pub use helpers::MethodSink;
pub use module::{MethodKind, Methods, Module, SubscriptionCallback};
pub use notifier::{Notifier, Subscription};

/// What a connection is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
	/// Whether plain method calls are served.
	pub method_invocation: bool,
	/// Whether subscriptions are served. Off for one-shot transports; a
	/// `*_subscribe` call then answers a notifications-unsupported error.
	pub subscriptions: bool,
}

impl CodecOptions {
	/// Full duplex surface.
	pub const ALL: Self = Self { method_invocation: true, subscriptions: true };
	/// Method calls only, the HTTP shape.
	pub const METHODS_ONLY: Self = Self { method_invocation: true, subscriptions: false };
}

impl Default for CodecOptions {
	fn default() -> Self {
		Self::ALL
	}
}

/// JSON-RPC server over arbitrary codecs.
///
/// Cheap to clone; all clones serve the same registry and share the stop
/// flag. Registration happens before serving starts, lookups afterwards are
/// lock-free.
#[derive(Clone)]
pub struct Server {
	methods: Methods,
	run: Arc<AtomicBool>,
	codecs: Arc<Mutex<FxHashMap<u64, Arc<dyn Codec>>>>,
	next_conn_id: Arc<AtomicU64>,
}

impl Default for Server {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server")
			.field("methods", &self.methods)
			.field("running", &self.run.load(Ordering::Relaxed))
			.field("connections", &self.codecs.lock().len())
			.finish()
	}
}

impl Server {
	/// Creates a server with an empty registry.
	pub fn new() -> Self {
		Self {
			methods: Methods::default(),
			run: Arc::new(AtomicBool::new(true)),
			codecs: Arc::new(Mutex::new(FxHashMap::default())),
			next_conn_id: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Registers a service module (or a whole [`Methods`] table).
	pub fn merge(&mut self, methods: impl Into<Methods>) {
		self.methods.merge(methods);
	}

	/// The registered callables.
	pub fn methods(&self) -> &Methods {
		&self.methods
	}

	/// Serves a persistent duplex connection until its codec fails or the
	/// server stops; the codec is closed on exit.
	///
	/// Batches decode in order, run concurrently, and are answered with one
	/// array preserving the request order. Every call runs as its own
	/// tracked future; shutdown waits for in-flight calls, then closes all
	/// subscriptions of the connection.
	pub async fn serve_codec(&self, codec: Arc<dyn Codec>, options: CodecOptions) {
		if !self.run.load(Ordering::Acquire) {
			codec.close();
			return;
		}
		let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
		self.codecs.lock().insert(conn_id, codec.clone());
		tracing::trace!("[Server::serve_codec] connection {} from {:?}", conn_id, codec.remote_addr());

		let (sink, mut sink_rx) = MethodSink::new();
		let notifier = Notifier::new(sink.clone());

		// Write loop: the only task touching the codec's write side.
		let write_codec = codec.clone();
		let write_sink = sink.clone();
		let writer = tokio::spawn(async move {
			while let Some(cmd) = sink_rx.next().await {
				match cmd {
					SinkCommand::Frame(json) => {
						if let Err(e) = write_codec.write(json).await {
							tracing::debug!("[Server::serve_codec] write failed: {}", e);
							write_sink.mark_closed();
							write_codec.close();
							break;
						}
					}
					SinkCommand::Shutdown => break,
				}
			}
		});

		let mut calls: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();
		loop {
			tokio::select! {
				read = codec.read_batch() => match read {
					Ok(incoming) => self.dispatch_incoming(incoming, &sink, &notifier, options, &mut calls),
					Err(CodecError::Parse(e)) => {
						tracing::debug!("[Server::serve_codec] unparseable frame: {}", e);
						sink.send_msg(&Message::invalid_request(ErrorObject::parse_error(e)));
						break;
					}
					Err(e) => {
						tracing::trace!("[Server::serve_codec] connection {} lost: {}", conn_id, e);
						break;
					}
				},
				Some(_) = calls.next(), if !calls.is_empty() => {}
			}
		}

		// Wait for in-flight calls, flush the sink, then tear down.
		while calls.next().await.is_some() {}
		notifier.close_all();
		sink.shutdown();
		let _ = writer.await;
		codec.close();
		self.codecs.lock().remove(&conn_id);
	}

	fn dispatch_incoming(
		&self,
		incoming: Incoming,
		sink: &MethodSink,
		notifier: &Notifier,
		options: CodecOptions,
		calls: &mut FuturesUnordered<BoxFuture<'static, ()>>,
	) {
		let Incoming { msgs, batch } = incoming;
		let notifier_opt = if options.subscriptions { Some(notifier) } else { None };
		if batch {
			if msgs.is_empty() {
				sink.send_msg(&Message::invalid_request(ErrorObject::invalid_request("empty batch")));
				return;
			}
			let futures: Vec<_> = msgs
				.into_iter()
				.map(|msg| handler::dispatch(&self.methods, notifier_opt, options, msg).into_future())
				.collect();
			let sink = sink.clone();
			let notifier = notifier.clone();
			calls.push(Box::pin(async move {
				let outcomes = futures_util::future::join_all(futures).await;
				let responses: Vec<&Message> = outcomes.iter().filter_map(|o| o.response.as_ref()).collect();
				if !responses.is_empty() {
					sink.send_json(&responses);
				}
				for outcome in &outcomes {
					if let Some(id) = &outcome.activate {
						notifier.activate(id);
					}
				}
			}));
		} else {
			let msg = match msgs.into_iter().next() {
				Some(msg) => msg,
				None => return,
			};
			match handler::dispatch(&self.methods, notifier_opt, options, msg) {
				Dispatched::Ready(outcome) => {
					if let Some(response) = &outcome.response {
						sink.send_msg(response);
					}
					if let Some(id) = &outcome.activate {
						notifier.activate(id);
					}
				}
				Dispatched::Future(fut) => {
					let sink = sink.clone();
					let notifier = notifier.clone();
					calls.push(Box::pin(async move {
						let outcome = fut.await;
						if let Some(response) = &outcome.response {
							sink.send_msg(response);
						}
						if let Some(id) = &outcome.activate {
							notifier.activate(id);
						}
					}));
				}
			}
		}
	}

	/// Serves exactly one request/response exchange, the HTTP shape:
	/// subscriptions are off regardless of `options`, and the reply is
	/// written in the form the request arrived in.
	pub async fn serve_single_request(&self, codec: &dyn Codec, options: CodecOptions) {
		let options = CodecOptions { subscriptions: false, ..options };
		if !self.run.load(Ordering::Acquire) {
			let reply = Message::invalid_request(ErrorObject::server_shutting_down());
			let _ = codec.write(serde_json::to_string(&reply).expect("messages serialize; qed")).await;
			return;
		}
		let Incoming { msgs, batch } = match codec.read_batch().await {
			Ok(incoming) => incoming,
			Err(CodecError::Parse(e)) => {
				let reply = Message::invalid_request(ErrorObject::parse_error(e));
				let _ = codec.write(serde_json::to_string(&reply).expect("messages serialize; qed")).await;
				return;
			}
			Err(_) => return,
		};
		if batch && msgs.is_empty() {
			let reply = Message::invalid_request(ErrorObject::invalid_request("empty batch"));
			let _ = codec.write(serde_json::to_string(&reply).expect("messages serialize; qed")).await;
			return;
		}
		let futures: Vec<_> =
			msgs.into_iter().map(|msg| handler::dispatch(&self.methods, None, options, msg).into_future()).collect();
		let outcomes = futures_util::future::join_all(futures).await;
		let responses: Vec<&Message> = outcomes.iter().filter_map(|o| o.response.as_ref()).collect();
		let reply = if batch {
			if responses.is_empty() {
				return;
			}
			serde_json::to_string(&responses).expect("messages serialize; qed")
		} else {
			match responses.first() {
				Some(response) => serde_json::to_string(response).expect("messages serialize; qed"),
				None => return,
			}
		};
		let _ = codec.write(reply).await;
	}

	/// Dispatches a raw JSON request in-process and returns the raw reply,
	/// `None` when the input was a notification. Handy for tests and for
	/// transports that already hold the whole request body.
	pub async fn raw_json_request(&self, body: &str) -> Option<String> {
		let codec = OneShotCodec::new(body);
		self.serve_single_request(&codec, CodecOptions::ALL).await;
		codec.take_response()
	}

	/// Stops the server: refuses new codecs and force-closes every live
	/// connection, which makes their pending reads return. Idempotent.
	pub fn stop(&self) {
		if self.run.swap(false, Ordering::AcqRel) {
			let codecs = self.codecs.lock();
			tracing::debug!("[Server::stop] closing {} connection(s)", codecs.len());
			for codec in codecs.values() {
				codec.close();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use duplexrpc_types::ErrorObject;

	fn test_server() -> Server {
		let mut module = Module::new("test", ()).unwrap();
		module.register_method("echo", |params, _| {
			let (s, n): (String, i64) = params.parse()?;
			Ok(format!("{}:{}", s, n))
		});
		module.register_async_method("sleepy", |_, _| async move { Ok("done") });
		module.register_method("fail", |_, _: &()| Err::<(), _>(ErrorObject::new(-32099, "deliberate")));
		let mut server = Server::new();
		server.merge(module);
		server
	}

	#[tokio::test]
	async fn echo_call() {
		let server = test_server();
		let reply = server
			.raw_json_request(r#"{"jsonrpc":"2.0","id":1,"method":"test_echo","params":["hi",7]}"#)
			.await
			.unwrap();
		assert_eq!(reply, r#"{"jsonrpc":"2.0","id":1,"result":"hi:7"}"#);
	}

	#[tokio::test]
	async fn method_not_found() {
		let server = test_server();
		let reply = server.raw_json_request(r#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#).await.unwrap();
		assert_eq!(
			reply,
			r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"the method nope does not exist/is not available"}}"#
		);
	}

	#[tokio::test]
	async fn async_method_runs() {
		let server = test_server();
		let reply = server.raw_json_request(r#"{"jsonrpc":"2.0","id":3,"method":"test_sleepy"}"#).await.unwrap();
		assert_eq!(reply, r#"{"jsonrpc":"2.0","id":3,"result":"done"}"#);
	}

	#[tokio::test]
	async fn callback_error_becomes_error_response() {
		let server = test_server();
		let reply = server.raw_json_request(r#"{"jsonrpc":"2.0","id":4,"method":"test_fail"}"#).await.unwrap();
		assert_eq!(reply, r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32099,"message":"deliberate"}}"#);
	}

	#[tokio::test]
	async fn batch_with_mixed_fate() {
		let server = test_server();
		let reply = server
			.raw_json_request(
				r#"[{"jsonrpc":"2.0","id":3,"method":"test_echo","params":["a",1]},{"jsonrpc":"2.0","id":4,"method":"nope"},{"jsonrpc":"2.0","id":5,"method":"test_echo","params":["b",2]}]"#,
			)
			.await
			.unwrap();
		let replies: Vec<Message> = serde_json::from_str(&reply).unwrap();
		assert_eq!(replies.len(), 3);
		assert_eq!(replies[0].result.as_ref().unwrap().get(), r#""a:1""#);
		assert_eq!(replies[1].error.as_ref().unwrap().code, -32601);
		assert_eq!(replies[2].result.as_ref().unwrap().get(), r#""b:2""#);
	}

	#[tokio::test]
	async fn empty_batch_is_invalid() {
		let server = test_server();
		let reply = server.raw_json_request("[]").await.unwrap();
		assert_eq!(reply, r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"empty batch"}}"#);
	}

	#[tokio::test]
	async fn invalid_request_id_is_rejected_with_null_id() {
		let server = test_server();
		let reply = server.raw_json_request(r#"{"jsonrpc":"2.0","id":null,"method":"test_echo"}"#).await.unwrap();
		let msg: Message = serde_json::from_str(&reply).unwrap();
		assert_eq!(msg.id, Some(duplexrpc_types::Id::Null));
		assert_eq!(msg.error.as_ref().unwrap().code, -32600);
	}

	#[tokio::test]
	async fn malformed_json_yields_parse_error() {
		let server = test_server();
		let reply = server.raw_json_request("{oops").await.unwrap();
		let msg: Message = serde_json::from_str(&reply).unwrap();
		assert_eq!(msg.error.as_ref().unwrap().code, -32700);
	}

	#[tokio::test]
	async fn notification_gets_no_reply() {
		let server = test_server();
		assert!(server.raw_json_request(r#"{"jsonrpc":"2.0","method":"test_echo","params":["x",1]}"#).await.is_none());
	}

	#[tokio::test]
	async fn subscribe_without_subscription_support() {
		let mut module = Module::new("test", ()).unwrap();
		module.register_subscription("ticks", |_, notifier, _| Ok(notifier.create_subscription()));
		let mut server = Server::new();
		server.merge(module);

		// One-shot dispatch always runs with subscriptions disabled.
		let reply =
			server.raw_json_request(r#"{"jsonrpc":"2.0","id":1,"method":"test_subscribe","params":["ticks"]}"#).await.unwrap();
		let msg: Message = serde_json::from_str(&reply).unwrap();
		let err = msg.error.unwrap();
		assert_eq!(err.code, -32000);
		assert_eq!(err.message, "notifications not supported");
	}

	#[tokio::test]
	async fn stopped_server_answers_shutdown_error() {
		let server = test_server();
		server.stop();
		server.stop();
		let reply = server.raw_json_request(r#"{"jsonrpc":"2.0","id":1,"method":"test_echo","params":["hi",7]}"#).await.unwrap();
		let msg: Message = serde_json::from_str(&reply).unwrap();
		let err = msg.error.unwrap();
		assert_eq!(err.code, -32000);
		assert_eq!(err.message, "server is shutting down");
	}
}
