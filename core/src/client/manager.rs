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

//! Bookkeeping of everything the dispatcher is waiting for: in-flight
//! request ids, batches, and live subscriptions. Mutated only on the
//! dispatcher task.

use rustc_hash::FxHashMap;
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};

use duplexrpc_types::{Message, SubscriptionId};

use crate::error::Error;

/// What the dispatcher feeds a subscription's forward loop.
#[derive(Debug)]
pub(crate) enum SubMsg {
	/// One raw notification payload.
	Notification(Box<RawValue>),
	/// The connection ended. `None` means the client was closed
	/// deliberately; the subscription then ends without an error.
	Closed(Option<Error>),
}

/// A pending op registered under a single request id.
#[derive(Debug)]
pub(crate) enum PendingKind {
	/// Plain call; the response is handed back as-is.
	Call { send_back: oneshot::Sender<Result<Message, Error>> },
	/// Subscribe call; a success response carries the subscription id.
	Subscribe {
		namespace: String,
		send_back: oneshot::Sender<Result<(SubscriptionId, mpsc::UnboundedReceiver<SubMsg>), Error>>,
	},
	/// Unsubscribe issued on behalf of a dropped or failed subscription;
	/// the answer is only logged.
	Unsubscribe { sub_id: SubscriptionId },
}

/// A pending batch: responses are matched to elements by id and delivered
/// together once the last one arrived.
#[derive(Debug)]
pub(crate) struct BatchState {
	order: FxHashMap<u64, usize>,
	pub(crate) responses: Vec<Option<Message>>,
	missing: usize,
	pub(crate) send_back: oneshot::Sender<Result<Vec<Option<Message>>, Error>>,
}

#[derive(Debug, Default)]
pub(crate) struct RequestManager {
	requests: FxHashMap<u64, PendingKind>,
	batches: FxHashMap<u64, BatchState>,
	batch_ids: FxHashMap<u64, u64>,
	subscriptions: FxHashMap<SubscriptionId, mpsc::UnboundedSender<SubMsg>>,
}

impl RequestManager {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// Registers a pending op; runs before the request hits the wire so a
	/// fast response always finds its waiter.
	pub(crate) fn insert(&mut self, id: u64, kind: PendingKind) {
		debug_assert!(!self.requests.contains_key(&id), "request ids are unique");
		self.requests.insert(id, kind);
	}

	pub(crate) fn remove(&mut self, id: u64) -> Option<PendingKind> {
		self.requests.remove(&id)
	}

	/// Registers a batch under its element ids; keyed by the first id.
	pub(crate) fn insert_batch(
		&mut self,
		ids: &[u64],
		send_back: oneshot::Sender<Result<Vec<Option<Message>>, Error>>,
	) {
		let key = ids[0];
		let order = ids.iter().copied().enumerate().map(|(idx, id)| (id, idx)).collect();
		for id in ids {
			self.batch_ids.insert(*id, key);
		}
		self.batches.insert(key, BatchState { order, responses: vec![None; ids.len()], missing: ids.len(), send_back });
	}

	pub(crate) fn remove_batch(&mut self, key: u64) -> Option<BatchState> {
		let state = self.batches.remove(&key)?;
		self.batch_ids.retain(|_, k| *k != key);
		Some(state)
	}

	/// Files one response into its batch; returns the finished batch once
	/// every element has arrived.
	pub(crate) fn complete_batch_item(&mut self, id: u64, msg: Message) -> Option<BatchState> {
		let key = self.batch_ids.remove(&id)?;
		let state = self.batches.get_mut(&key)?;
		if let Some(slot) = state.order.get(&id).copied() {
			if state.responses[slot].is_none() {
				state.missing -= 1;
				state.responses[slot] = Some(msg);
			}
		}
		if state.missing == 0 {
			self.batches.remove(&key)
		} else {
			None
		}
	}

	pub(crate) fn insert_subscription(&mut self, id: SubscriptionId, tx: mpsc::UnboundedSender<SubMsg>) {
		self.subscriptions.insert(id, tx);
	}

	pub(crate) fn remove_subscription(&mut self, id: &SubscriptionId) -> Option<mpsc::UnboundedSender<SubMsg>> {
		self.subscriptions.remove(id)
	}

	pub(crate) fn subscription(&self, id: &SubscriptionId) -> Option<&mpsc::UnboundedSender<SubMsg>> {
		self.subscriptions.get(id)
	}

	/// Fails every pending op and terminates every live subscription.
	/// `op_err` produces the error each waiter receives; `sub_err` the value
	/// each subscription ends with (`None` for a deliberate close).
	pub(crate) fn fail_all(&mut self, op_err: &dyn Fn() -> Error, sub_err: &dyn Fn() -> Option<Error>) {
		for (_, kind) in self.requests.drain() {
			match kind {
				PendingKind::Call { send_back } => {
					let _ = send_back.send(Err(op_err()));
				}
				PendingKind::Subscribe { send_back, .. } => {
					let _ = send_back.send(Err(op_err()));
				}
				PendingKind::Unsubscribe { .. } => {}
			}
		}
		self.batch_ids.clear();
		for (_, state) in self.batches.drain() {
			let _ = state.send_back.send(Err(op_err()));
		}
		for (_, tx) in self.subscriptions.drain() {
			let _ = tx.send(SubMsg::Closed(sub_err()));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use duplexrpc_types::Id;

	fn response(id: u64) -> Message {
		Message::response(Id::Number(id), serde_json::value::to_raw_value(&id).unwrap())
	}

	#[test]
	fn batch_completes_when_all_responses_arrived() {
		let mut manager = RequestManager::new();
		let (tx, _rx) = oneshot::channel();
		manager.insert_batch(&[3, 4, 5], tx);

		assert!(manager.complete_batch_item(4, response(4)).is_none());
		assert!(manager.complete_batch_item(3, response(3)).is_none());
		let state = manager.complete_batch_item(5, response(5)).unwrap();

		// Order follows the request order, not the arrival order.
		let ids: Vec<u64> =
			state.responses.iter().map(|r| r.as_ref().unwrap().id.as_ref().unwrap().as_number().unwrap()).collect();
		assert_eq!(ids, vec![3, 4, 5]);
	}

	#[test]
	fn unknown_ids_do_not_match_batches() {
		let mut manager = RequestManager::new();
		let (tx, _rx) = oneshot::channel();
		manager.insert_batch(&[1], tx);
		assert!(manager.complete_batch_item(9, response(9)).is_none());
	}

	#[tokio::test]
	async fn fail_all_reaches_every_waiter() {
		let mut manager = RequestManager::new();
		let (call_tx, call_rx) = oneshot::channel();
		manager.insert(1, PendingKind::Call { send_back: call_tx });
		let (batch_tx, batch_rx) = oneshot::channel();
		manager.insert_batch(&[2, 3], batch_tx);
		let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
		manager.insert_subscription(SubscriptionId::new("0x1"), sub_tx);

		manager.fail_all(&|| Error::ClientQuit, &|| None);

		assert!(matches!(call_rx.await.unwrap(), Err(Error::ClientQuit)));
		assert!(matches!(batch_rx.await.unwrap(), Err(Error::ClientQuit)));
		assert!(matches!(sub_rx.recv().await.unwrap(), SubMsg::Closed(None)));
	}
}
