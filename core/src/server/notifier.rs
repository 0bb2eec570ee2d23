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
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::sync::watch;

use duplexrpc_types::subscription::subscription_method;
use duplexrpc_types::{ErrorObject, Message, SubscriptionId, SubscriptionPayload};

use crate::error::Error;
use crate::id_providers::RandomHexIdProvider;
use crate::server::helpers::MethodSink;
use crate::traits::IdProvider;

/// Per-connection registry of server-side subscriptions and the handle a
/// subscribe callback uses to push notifications.
///
/// A subscription starts out *inactive*: values pushed through
/// [`Notifier::notify`] are queued until the subscribe call's response has
/// been handed to the connection's ordered sink, then flushed in FIFO order.
/// Without that barrier a client could observe a notification for an id it
/// has never seen.
#[derive(Debug, Clone)]
pub struct Notifier {
	inner: Arc<NotifierInner>,
	namespace: Arc<str>,
}

#[derive(Debug)]
struct NotifierInner {
	sink: MethodSink,
	id_provider: Arc<dyn IdProvider>,
	active: Mutex<FxHashMap<SubscriptionId, ServerSubscription>>,
}

#[derive(Debug)]
struct ServerSubscription {
	namespace: Arc<str>,
	queue: Vec<Box<RawValue>>,
	activated: bool,
	done: watch::Sender<bool>,
}

/// Capability returned by a subscribe callback; carries the allocated id and
/// a cancellation signal for producer tasks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Subscription {
	id: SubscriptionId,
	done: watch::Receiver<bool>,
}

impl Subscription {
	/// The wire id of the subscription.
	pub fn id(&self) -> &SubscriptionId {
		&self.id
	}

	/// Resolves once the subscription is unsubscribed or its connection is
	/// gone. Producer tasks select on this to stop.
	pub async fn canceled(&mut self) {
		loop {
			if *self.done.borrow_and_update() {
				return;
			}
			if self.done.changed().await.is_err() {
				return;
			}
		}
	}
}

impl Notifier {
	pub(crate) fn new(sink: MethodSink) -> Self {
		Self::with_id_provider(sink, Arc::new(RandomHexIdProvider))
	}

	pub(crate) fn with_id_provider(sink: MethodSink, id_provider: Arc<dyn IdProvider>) -> Self {
		Self {
			inner: Arc::new(NotifierInner { sink, id_provider, active: Mutex::new(FxHashMap::default()) }),
			namespace: Arc::from(""),
		}
	}

	/// View of this notifier bound to the namespace of the subscribe call it
	/// is handed to; notifications go out as `<namespace>_subscription`.
	pub(crate) fn scoped(&self, namespace: &str) -> Self {
		Self { inner: self.inner.clone(), namespace: Arc::from(namespace) }
	}

	/// The namespace this handle is bound to.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Allocates a fresh subscription in inactive state.
	pub fn create_subscription(&self) -> Subscription {
		let id = self.inner.id_provider.next_id();
		let (done, done_rx) = watch::channel(false);
		let sub = ServerSubscription { namespace: self.namespace.clone(), queue: Vec::new(), activated: false, done };
		self.inner.active.lock().insert(id.clone(), sub);
		tracing::trace!("[Notifier::create_subscription] id={}", id);
		Subscription { id, done: done_rx }
	}

	/// Pushes one value to the subscriber.
	///
	/// Queued while the subscription is inactive, written through the
	/// connection sink once active. Fails with [`Error::SubscriptionClosed`]
	/// when the subscription or its connection is gone.
	pub fn notify<T: Serialize>(&self, id: &SubscriptionId, value: &T) -> Result<(), Error> {
		let raw = serde_json::value::to_raw_value(value)?;
		let mut active = self.inner.active.lock();
		let sub = active.get_mut(id).ok_or(Error::SubscriptionClosed)?;
		if sub.activated {
			let frame = subscription_frame(&sub.namespace, id, raw)?;
			if !self.inner.sink.send_raw(frame) {
				return Err(Error::SubscriptionClosed);
			}
		} else {
			sub.queue.push(raw);
		}
		Ok(())
	}

	/// Flips a subscription to active and flushes its queue in order.
	///
	/// Runs under the notifier lock so no `notify` can interleave between
	/// the flush and the state change. Called after the subscribe response
	/// has been enqueued on the same sink.
	pub(crate) fn activate(&self, id: &SubscriptionId) {
		let mut active = self.inner.active.lock();
		let sub = match active.get_mut(id) {
			Some(sub) => sub,
			None => return,
		};
		sub.activated = true;
		let queued = std::mem::take(&mut sub.queue);
		let namespace = sub.namespace.clone();
		for raw in queued {
			match subscription_frame(&namespace, id, raw) {
				Ok(frame) => {
					self.inner.sink.send_raw(frame);
				}
				Err(e) => tracing::error!("[Notifier::activate] dropping queued notification: {}", e),
			}
		}
	}

	/// Removes a subscription and fires its done signal.
	pub(crate) fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), ErrorObject> {
		match self.inner.active.lock().remove(id) {
			Some(sub) => {
				tracing::trace!("[Notifier::unsubscribe] id={}", id);
				let _ = sub.done.send(true);
				Ok(())
			}
			None => Err(ErrorObject::unknown_subscription(id.as_str())),
		}
	}

	/// Drops every subscription of the connection; their capabilities all
	/// signal done. Runs when the connection shuts down.
	pub(crate) fn close_all(&self) {
		let subs = std::mem::take(&mut *self.inner.active.lock());
		for (id, sub) in subs {
			tracing::trace!("[Notifier::close_all] dropping subscription {}", id);
			let _ = sub.done.send(true);
		}
	}
}

fn subscription_frame(namespace: &str, id: &SubscriptionId, result: Box<RawValue>) -> Result<String, serde_json::Error> {
	let payload = SubscriptionPayload { subscription: id.clone(), result };
	let params = serde_json::value::to_raw_value(&payload)?;
	serde_json::to_string(&Message::notification(subscription_method(namespace), Some(params)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::helpers::SinkCommand;
	use futures_util::StreamExt;

	fn frame(cmd: SinkCommand) -> String {
		match cmd {
			SinkCommand::Frame(json) => json,
			SinkCommand::Shutdown => panic!("expected frame"),
		}
	}

	#[tokio::test]
	async fn notifications_are_queued_until_activation() {
		let (sink, mut rx) = MethodSink::new();
		let notifier = Notifier::new(sink).scoped("test");
		let sub = notifier.create_subscription();

		notifier.notify(sub.id(), &0u32).unwrap();
		notifier.notify(sub.id(), &1u32).unwrap();

		// Nothing on the wire yet.
		assert!(rx.try_next().is_err());

		notifier.activate(sub.id());
		notifier.notify(sub.id(), &2u32).unwrap();

		for expected in 0..3u32 {
			let json = frame(rx.next().await.unwrap());
			let expected_json = format!(
				r#"{{"jsonrpc":"2.0","method":"test_subscription","params":{{"subscription":"{}","result":{}}}}}"#,
				sub.id(),
				expected
			);
			assert_eq!(json, expected_json);
		}
	}

	#[tokio::test]
	async fn unsubscribe_fires_done_and_rejects_later_notifies() {
		let (sink, _rx) = MethodSink::new();
		let notifier = Notifier::new(sink).scoped("test");
		let mut sub = notifier.create_subscription();

		notifier.unsubscribe(sub.id()).unwrap();
		assert!(notifier.unsubscribe(sub.id()).is_err());
		assert!(matches!(notifier.notify(sub.id(), &1u32), Err(Error::SubscriptionClosed)));

		// Resolves immediately.
		sub.canceled().await;
	}

	#[tokio::test]
	async fn close_all_cancels_every_subscription() {
		let (sink, _rx) = MethodSink::new();
		let notifier = Notifier::new(sink).scoped("test");
		let mut a = notifier.create_subscription();
		let mut b = notifier.create_subscription();

		notifier.close_all();
		a.canceled().await;
		b.canceled().await;
		assert!(notifier.notify(a.id(), &1u32).is_err());
	}
}
