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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_channel::mpsc;
use serde::Serialize;

use duplexrpc_types::{ErrorObject, Id, Message};

/// Command consumed by the connection's write loop.
#[derive(Debug)]
pub(crate) enum SinkCommand {
	/// A serialized value to put on the wire.
	Frame(String),
	/// Flush everything queued so far, then stop.
	Shutdown,
}

/// Ordered outbound queue of a connection.
///
/// Responses and subscription notifications from any task go through one
/// sink; the connection's write loop drains it in FIFO order. That ordering
/// is what the subscription activation barrier relies on: a notification
/// enqueued after its subscribe response cannot overtake it.
#[derive(Debug, Clone)]
pub struct MethodSink {
	tx: mpsc::UnboundedSender<SinkCommand>,
	closed: Arc<AtomicBool>,
}

impl MethodSink {
	pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<SinkCommand>) {
		let (tx, rx) = mpsc::unbounded();
		(Self { tx, closed: Arc::new(AtomicBool::new(false)) }, rx)
	}

	/// Enqueues a success response.
	pub fn send_response<T: Serialize>(&self, id: Id, result: &T) -> bool {
		let msg = match serde_json::value::to_raw_value(result) {
			Ok(raw) => Message::response(id, raw),
			Err(e) => Message::error_response(id, ErrorObject::internal(e)),
		};
		self.send_msg(&msg)
	}

	/// Enqueues an error response.
	pub fn send_error(&self, id: Id, error: ErrorObject) -> bool {
		self.send_msg(&Message::error_response(id, error))
	}

	/// Enqueues a single frame.
	pub fn send_msg(&self, msg: &Message) -> bool {
		self.send_json(msg)
	}

	/// Enqueues any serializable value, e.g. a batch reply array.
	pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
		match serde_json::to_string(value) {
			Ok(json) => self.send_raw(json),
			Err(e) => {
				tracing::error!("[MethodSink::send_json] serialization failed: {}", e);
				false
			}
		}
	}

	/// Enqueues pre-serialized JSON.
	pub fn send_raw(&self, json: String) -> bool {
		if self.is_closed() {
			return false;
		}
		self.tx.unbounded_send(SinkCommand::Frame(json)).is_ok()
	}

	/// Whether the write side has failed or shut down.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire) || self.tx.is_closed()
	}

	/// Marks the sink dead after a write failure.
	pub(crate) fn mark_closed(&self) {
		self.closed.store(true, Ordering::Release);
	}

	/// Asks the write loop to flush queued frames and stop.
	pub(crate) fn shutdown(&self) {
		let _ = self.tx.unbounded_send(SinkCommand::Shutdown);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures_util::StreamExt;

	#[tokio::test]
	async fn frames_are_delivered_in_order() {
		let (sink, mut rx) = MethodSink::new();
		assert!(sink.send_response(Id::Number(1), &"one"));
		assert!(sink.send_error(Id::Number(2), ErrorObject::method_not_found("nope")));
		sink.shutdown();

		let first = rx.next().await.unwrap();
		match first {
			SinkCommand::Frame(json) => assert_eq!(json, r#"{"jsonrpc":"2.0","id":1,"result":"one"}"#),
			SinkCommand::Shutdown => panic!("expected frame"),
		}
		assert!(matches!(rx.next().await, Some(SinkCommand::Frame(_))));
		assert!(matches!(rx.next().await, Some(SinkCommand::Shutdown)));
	}

	#[tokio::test]
	async fn marked_closed_rejects_frames() {
		let (sink, _rx) = MethodSink::new();
		sink.mark_closed();
		assert!(!sink.send_raw("{}".into()));
	}
}
