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

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use duplexrpc_types::SubscriptionId;

use crate::client::async_client::FrontToBack;
use crate::client::manager::SubMsg;
use crate::error::Error;

/// A live client-side subscription delivering decoded values in the order
/// the server emitted them.
///
/// The stream ends on [`unsubscribe`](ClientSubscription::unsubscribe), on a
/// deliberate client close, on a decode failure, when the connection drops,
/// or when the forward buffer overflows because the consumer is too slow. In
/// the failure cases [`take_error`](ClientSubscription::take_error) yields
/// the reason exactly once after the stream has ended; a clean shutdown
/// leaves no error.
#[derive(Debug)]
pub struct ClientSubscription<N> {
	id: SubscriptionId,
	namespace: String,
	rx: mpsc::Receiver<N>,
	err: Arc<Mutex<Option<Error>>>,
	to_back: mpsc::UnboundedSender<FrontToBack>,
	unsubscribed: bool,
}

impl<N: DeserializeOwned + Send + 'static> ClientSubscription<N> {
	pub(crate) fn new(
		id: SubscriptionId,
		namespace: String,
		in_rx: mpsc::UnboundedReceiver<SubMsg>,
		buffer: usize,
		to_back: mpsc::UnboundedSender<FrontToBack>,
	) -> Self {
		let (out_tx, rx) = mpsc::channel(buffer.max(1));
		let err = Arc::new(Mutex::new(None));
		tokio::spawn(forward::<N>(in_rx, out_tx, err.clone(), to_back.clone(), namespace.clone(), id.clone()));
		Self { id, namespace, rx, err, to_back, unsubscribed: false }
	}

	/// The server-allocated id.
	pub fn id(&self) -> &SubscriptionId {
		&self.id
	}

	/// The namespace the subscription was opened under.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Returns the next value, or `None` once the subscription has ended.
	pub async fn next(&mut self) -> Option<N> {
		self.rx.recv().await
	}

	/// Why the subscription ended; `None` while it is live or after a clean
	/// shutdown. The error is yielded at most once.
	pub fn take_error(&mut self) -> Option<Error> {
		self.err.lock().take()
	}

	/// Tells the server to stop and ends the local stream. The server's
	/// answer does not gate the local teardown.
	pub async fn unsubscribe(mut self) {
		self.unsubscribed = true;
		let _ = self
			.to_back
			.send(FrontToBack::SubscriptionClosed { namespace: self.namespace.clone(), id: self.id.clone() });
	}
}

impl<N> Drop for ClientSubscription<N> {
	fn drop(&mut self) {
		if !self.unsubscribed {
			let _ = self
				.to_back
				.send(FrontToBack::SubscriptionClosed { namespace: self.namespace.clone(), id: self.id.clone() });
		}
	}
}

/// Moves raw payloads from the dispatcher into the typed user channel.
///
/// The user channel doubles as the forward buffer: an arrival that finds it
/// full ends the subscription with [`Error::SubscriptionQueueOverflow`] and
/// asks the server to unsubscribe. Everything buffered before the overflow
/// stays readable, so the consumer sees exactly the buffered prefix and then
/// the end of the stream.
async fn forward<N: DeserializeOwned>(
	mut in_rx: mpsc::UnboundedReceiver<SubMsg>,
	out_tx: mpsc::Sender<N>,
	err: Arc<Mutex<Option<Error>>>,
	to_back: mpsc::UnboundedSender<FrontToBack>,
	namespace: String,
	id: SubscriptionId,
) {
	loop {
		match in_rx.recv().await {
			// The dispatcher dropped us: a local unsubscribe. Clean end.
			None => return,
			Some(SubMsg::Closed(reason)) => {
				*err.lock() = reason;
				return;
			}
			Some(SubMsg::Notification(raw)) => match serde_json::from_str::<N>(raw.get()) {
				Ok(value) => match out_tx.try_send(value) {
					Ok(()) => {}
					Err(TrySendError::Full(_)) => {
						tracing::debug!("[ClientSubscription] buffer overflow on {}, unsubscribing", id);
						*err.lock() = Some(Error::SubscriptionQueueOverflow);
						let _ = to_back.send(FrontToBack::SubscriptionClosed { namespace, id });
						return;
					}
					// The user dropped the handle; its Drop has already
					// requested the unsubscribe.
					Err(TrySendError::Closed(_)) => return,
				},
				Err(e) => {
					tracing::debug!("[ClientSubscription] undecodable notification on {}: {}", id, e);
					*err.lock() = Some(Error::ParseError(e));
					let _ = to_back.send(FrontToBack::SubscriptionClosed { namespace, id });
					return;
				}
			},
		}
	}
}
