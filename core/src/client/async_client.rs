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

//! The client's dispatcher task: owns the codec, the in-flight request map
//! and the live subscriptions; everything the public surface does arrives
//! here as a [`FrontToBack`] op.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};

use duplexrpc_types::{prepend_param, Id, Message, MessageKind, SubscriptionId, SubscriptionPayload};

use crate::client::manager::{BatchState, PendingKind, RequestManager, SubMsg};
use crate::codec::{Codec, CodecError, Incoming};
use crate::error::Error;

/// Async connection factory for stream transports; invoked once per
/// reconnect attempt.
pub type Dial = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Codec>, Error>> + Send + Sync>;

/// Ops the public client surface hands to the dispatcher.
#[derive(Debug)]
pub(crate) enum FrontToBack {
	Request {
		method: String,
		params: Option<Box<RawValue>>,
		send_back: oneshot::Sender<Result<Message, Error>>,
	},
	Batch {
		requests: Vec<(String, Option<Box<RawValue>>)>,
		send_back: oneshot::Sender<Result<Vec<Option<Message>>, Error>>,
	},
	Notification {
		method: String,
		params: Option<Box<RawValue>>,
		send_back: oneshot::Sender<Result<(), Error>>,
	},
	Subscribe {
		namespace: String,
		name: String,
		params: Option<Box<RawValue>>,
		send_back: oneshot::Sender<Result<(SubscriptionId, mpsc::UnboundedReceiver<SubMsg>), Error>>,
	},
	/// The user dropped or unsubscribed a subscription; stop routing it and
	/// tell the server.
	SubscriptionClosed { namespace: String, id: SubscriptionId },
	/// Deliberate shutdown.
	Close,
}

pub(crate) struct BackgroundTask {
	codec: Option<Arc<dyn Codec>>,
	dial: Option<Dial>,
	manager: RequestManager,
	next_id: u64,
	from_front: mpsc::UnboundedReceiver<FrontToBack>,
	reader_rx: Option<mpsc::UnboundedReceiver<Result<Incoming, CodecError>>>,
}

impl BackgroundTask {
	pub(crate) fn new(
		codec: Option<Arc<dyn Codec>>,
		dial: Option<Dial>,
		from_front: mpsc::UnboundedReceiver<FrontToBack>,
	) -> Self {
		Self { codec, dial, manager: RequestManager::new(), next_id: 0, from_front, reader_rx: None }
	}

	/// Dispatcher loop: selects between front-to-back ops and frames from
	/// the reader; registration always happens before a frame is written so
	/// a fast response cannot race its waiter.
	pub(crate) async fn run(mut self) {
		if let Some(codec) = self.codec.take() {
			self.install_codec(codec);
		}
		loop {
			let event = if let Some(reader) = self.reader_rx.as_mut() {
				tokio::select! {
					maybe_op = self.from_front.recv() => Event::Op(maybe_op),
					maybe_read = reader.recv() => Event::Read(maybe_read),
				}
			} else {
				Event::Op(self.from_front.recv().await)
			};
			match event {
				// All client handles are gone, or the user asked to close.
				Event::Op(None) | Event::Op(Some(FrontToBack::Close)) => {
					self.shutdown();
					return;
				}
				Event::Op(Some(op)) => self.handle_op(op).await,
				Event::Read(Some(Ok(incoming))) => self.handle_incoming(incoming).await,
				Event::Read(Some(Err(e))) => self.disconnect(Error::from(e)),
				Event::Read(None) => self.disconnect(Error::Transport(anyhow::anyhow!("connection closed"))),
			}
		}
	}

	fn next_request_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}

	fn install_codec(&mut self, codec: Arc<dyn Codec>) {
		let (tx, rx) = mpsc::unbounded_channel();
		self.reader_rx = Some(rx);
		self.codec = Some(codec.clone());
		// Reader: the only task touching the codec's read side.
		tokio::spawn(async move {
			loop {
				match codec.read_batch().await {
					Ok(incoming) => {
						if tx.send(Ok(incoming)).is_err() {
							return;
						}
					}
					Err(e) => {
						let _ = tx.send(Err(e));
						return;
					}
				}
			}
		});
	}

	/// Returns a live codec, dialing once if the connection is down.
	async fn ensure_connected(&mut self) -> Result<Arc<dyn Codec>, Error> {
		if let Some(codec) = &self.codec {
			return Ok(codec.clone());
		}
		let dial = match &self.dial {
			Some(dial) => dial,
			None => return Err(Error::ClientQuit),
		};
		tracing::debug!("[Client] connection down, dialing");
		let codec = dial().await?;
		self.install_codec(codec.clone());
		Ok(codec)
	}

	/// Drops the connection: the next op triggers a single dial attempt.
	/// Pending ops fail with the read error; open subscriptions end with it.
	fn disconnect(&mut self, err: Error) {
		tracing::debug!("[Client] connection lost: {}", err);
		if let Some(codec) = self.codec.take() {
			codec.close();
		}
		self.reader_rx = None;
		let reason = err.to_string();
		self.manager.fail_all(
			&|| Error::Transport(anyhow::anyhow!("{}", reason)),
			&|| Some(Error::Transport(anyhow::anyhow!("{}", reason))),
		);
	}

	/// Deliberate close: pending ops observe [`Error::ClientQuit`], open
	/// subscriptions end without an error.
	fn shutdown(&mut self) {
		tracing::trace!("[Client] dispatcher shutting down");
		if let Some(codec) = self.codec.take() {
			codec.close();
		}
		self.reader_rx = None;
		self.manager.fail_all(&|| Error::ClientQuit, &|| None);
	}

	async fn handle_op(&mut self, op: FrontToBack) {
		match op {
			FrontToBack::Request { method, params, send_back } => {
				let codec = match self.ensure_connected().await {
					Ok(codec) => codec,
					Err(e) => {
						let _ = send_back.send(Err(e));
						return;
					}
				};
				let id = self.next_request_id();
				let msg = Message::request(Id::Number(id), method, params);
				let json = match serde_json::to_string(&msg) {
					Ok(json) => json,
					Err(e) => {
						let _ = send_back.send(Err(e.into()));
						return;
					}
				};
				self.manager.insert(id, PendingKind::Call { send_back });
				if let Err(e) = codec.write(json).await {
					if let Some(PendingKind::Call { send_back }) = self.manager.remove(id) {
						let _ = send_back.send(Err(write_error(&e)));
					}
					self.disconnect(e.into());
				}
			}
			FrontToBack::Batch { requests, send_back } => {
				let codec = match self.ensure_connected().await {
					Ok(codec) => codec,
					Err(e) => {
						let _ = send_back.send(Err(e));
						return;
					}
				};
				let mut ids = Vec::with_capacity(requests.len());
				let mut msgs = Vec::with_capacity(requests.len());
				for (method, params) in requests {
					let id = self.next_request_id();
					ids.push(id);
					msgs.push(Message::request(Id::Number(id), method, params));
				}
				let json = match serde_json::to_string(&msgs) {
					Ok(json) => json,
					Err(e) => {
						let _ = send_back.send(Err(e.into()));
						return;
					}
				};
				self.manager.insert_batch(&ids, send_back);
				if let Err(e) = codec.write(json).await {
					if let Some(state) = self.manager.remove_batch(ids[0]) {
						let _ = state.send_back.send(Err(write_error(&e)));
					}
					self.disconnect(e.into());
				}
			}
			FrontToBack::Notification { method, params, send_back } => {
				let codec = match self.ensure_connected().await {
					Ok(codec) => codec,
					Err(e) => {
						let _ = send_back.send(Err(e));
						return;
					}
				};
				let msg = Message::notification(method, params);
				let json = match serde_json::to_string(&msg) {
					Ok(json) => json,
					Err(e) => {
						let _ = send_back.send(Err(e.into()));
						return;
					}
				};
				match codec.write(json).await {
					Ok(()) => {
						let _ = send_back.send(Ok(()));
					}
					Err(e) => {
						let _ = send_back.send(Err(write_error(&e)));
						self.disconnect(e.into());
					}
				}
			}
			FrontToBack::Subscribe { namespace, name, params, send_back } => {
				let codec = match self.ensure_connected().await {
					Ok(codec) => codec,
					Err(e) => {
						let _ = send_back.send(Err(e));
						return;
					}
				};
				// The subscription name travels as the first positional arg.
				let full_params = match prepend_param(&name, params.as_deref()) {
					Ok(params) => Some(params),
					Err(e) => {
						let _ = send_back.send(Err(Error::Call(e)));
						return;
					}
				};
				let id = self.next_request_id();
				let msg = Message::request(Id::Number(id), format!("{}_subscribe", namespace), full_params);
				let json = match serde_json::to_string(&msg) {
					Ok(json) => json,
					Err(e) => {
						let _ = send_back.send(Err(e.into()));
						return;
					}
				};
				self.manager.insert(id, PendingKind::Subscribe { namespace, send_back });
				if let Err(e) = codec.write(json).await {
					if let Some(PendingKind::Subscribe { send_back, .. }) = self.manager.remove(id) {
						let _ = send_back.send(Err(write_error(&e)));
					}
					self.disconnect(e.into());
				}
			}
			FrontToBack::SubscriptionClosed { namespace, id } => {
				if self.manager.remove_subscription(&id).is_some() {
					self.send_unsubscribe(namespace, id).await;
				}
			}
			FrontToBack::Close => unreachable!("Close is handled by the run loop"),
		}
	}

	async fn send_unsubscribe(&mut self, namespace: String, sub_id: SubscriptionId) {
		let codec = match &self.codec {
			Some(codec) => codec.clone(),
			None => return,
		};
		let id = self.next_request_id();
		let params = match serde_json::value::to_raw_value(&(&sub_id,)) {
			Ok(params) => Some(params),
			Err(e) => {
				tracing::error!("[Client] cannot serialize unsubscribe params: {}", e);
				return;
			}
		};
		let msg = Message::request(Id::Number(id), format!("{}_unsubscribe", namespace), params);
		let json = match serde_json::to_string(&msg) {
			Ok(json) => json,
			Err(e) => {
				tracing::error!("[Client] cannot serialize unsubscribe call: {}", e);
				return;
			}
		};
		self.manager.insert(id, PendingKind::Unsubscribe { sub_id });
		if let Err(e) = codec.write(json).await {
			self.manager.remove(id);
			self.disconnect(e.into());
		}
	}

	async fn handle_incoming(&mut self, incoming: Incoming) {
		for msg in incoming.msgs {
			self.handle_msg(msg).await;
		}
	}

	async fn handle_msg(&mut self, msg: Message) {
		match msg.kind() {
			MessageKind::Response => {
				let id = match msg.id.as_ref().and_then(|id| id.as_number()) {
					Some(id) => id,
					None => {
						tracing::debug!("[Client] dropping response with foreign id {:?}", msg.id);
						return;
					}
				};
				if let Some(kind) = self.manager.remove(id) {
					match kind {
						PendingKind::Call { send_back } => {
							let _ = send_back.send(Ok(msg));
						}
						PendingKind::Subscribe { namespace, send_back } => {
							self.complete_subscribe(namespace, msg, send_back).await;
						}
						PendingKind::Unsubscribe { sub_id } => {
							tracing::debug!("[Client] unsubscribe of {} acknowledged", sub_id);
						}
					}
				} else if let Some(batch) = self.manager.complete_batch_item(id, msg) {
					let BatchState { responses, send_back, .. } = batch;
					let _ = send_back.send(Ok(responses));
				} else {
					// Either never ours or the waiter gave up; both are fine.
					tracing::debug!("[Client] dropping response for unknown id {}", id);
				}
			}
			MessageKind::Notification if msg.is_subscription_notification() => {
				let params = match msg.params.as_deref() {
					Some(params) => params,
					None => return,
				};
				match serde_json::from_str::<SubscriptionPayload>(params.get()) {
					Ok(payload) => match self.manager.subscription(&payload.subscription) {
						Some(tx) => {
							let _ = tx.send(SubMsg::Notification(payload.result));
						}
						None => {
							tracing::trace!("[Client] dropping notification for unknown subscription {}", payload.subscription)
						}
					},
					Err(e) => tracing::debug!("[Client] malformed subscription notification: {}", e),
				}
			}
			// Inbound method invocation is a server affair; this side never
			// serves calls.
			MessageKind::Notification | MessageKind::Request => {
				tracing::debug!("[Client] dropping inbound call {:?}", msg.method);
			}
			MessageKind::Invalid => tracing::debug!("[Client] dropping invalid frame"),
		}
	}

	async fn complete_subscribe(
		&mut self,
		namespace: String,
		msg: Message,
		send_back: oneshot::Sender<Result<(SubscriptionId, mpsc::UnboundedReceiver<SubMsg>), Error>>,
	) {
		if let Some(err) = msg.error {
			let _ = send_back.send(Err(Error::Call(err)));
			return;
		}
		let sub_id: SubscriptionId = match msg.result.as_deref().map(|raw| serde_json::from_str(raw.get())) {
			Some(Ok(sub_id)) => sub_id,
			_ => {
				let _ = send_back.send(Err(Error::InvalidSubscriptionId));
				return;
			}
		};
		if sub_id.as_str().is_empty() {
			let _ = send_back.send(Err(Error::InvalidSubscriptionId));
			return;
		}
		let (tx, rx) = mpsc::unbounded_channel();
		self.manager.insert_subscription(sub_id.clone(), tx);
		if send_back.send(Ok((sub_id.clone(), rx))).is_err() {
			// The subscriber gave up while the reply was in flight.
			self.manager.remove_subscription(&sub_id);
			self.send_unsubscribe(namespace, sub_id).await;
		}
	}
}

enum Event {
	Op(Option<FrontToBack>),
	Read(Option<Result<Incoming, CodecError>>),
}

fn write_error(e: &CodecError) -> Error {
	Error::Transport(anyhow::anyhow!("send failed: {}", e))
}
