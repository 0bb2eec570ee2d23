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

//! HTTP fast path: one-shot request/response exchanges that bypass the
//! dispatcher entirely. Subscriptions do not exist here.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::value::RawValue;

use duplexrpc_types::{parse_incoming, Id, Message, MessageKind};

use crate::error::Error;

/// One synchronous HTTP round trip; the concrete client (hyper, test stub)
/// lives outside the engine.
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug + 'static {
	/// POSTs a JSON body and returns the response body; empty when the
	/// server had nothing to say (a notification).
	async fn post(&self, body: String) -> Result<String, Error>;
}

pub(crate) async fn call(
	transport: &Arc<dyn HttpTransport>,
	next_id: &AtomicU64,
	method: String,
	params: Option<Box<RawValue>>,
) -> Result<Message, Error> {
	let id = next_id.fetch_add(1, Ordering::Relaxed) + 1;
	let msg = Message::request(Id::Number(id), method, params);
	let body = transport.post(serde_json::to_string(&msg)?).await?;
	let (msgs, batch) = parse_incoming(&body)?;
	if batch || msgs.len() != 1 {
		return Err(Error::Transport(anyhow::anyhow!("expected a single response")));
	}
	let response = msgs.into_iter().next().expect("checked length; qed");
	if response.kind() != MessageKind::Response {
		return Err(Error::Transport(anyhow::anyhow!("expected a response frame")));
	}
	// Only the id we just sent may come back.
	match response.id.as_ref().and_then(Id::as_number) {
		Some(got) if got == id => Ok(response),
		_ => Err(Error::InvalidRequestId),
	}
}

pub(crate) async fn batch(
	transport: &Arc<dyn HttpTransport>,
	next_id: &AtomicU64,
	requests: Vec<(String, Option<Box<RawValue>>)>,
) -> Result<Vec<Option<Message>>, Error> {
	let mut msgs = Vec::with_capacity(requests.len());
	let mut slots: FxHashMap<u64, usize> = FxHashMap::default();
	for (index, (method, params)) in requests.into_iter().enumerate() {
		let id = next_id.fetch_add(1, Ordering::Relaxed) + 1;
		slots.insert(id, index);
		msgs.push(Message::request(Id::Number(id), method, params));
	}
	let body = transport.post(serde_json::to_string(&msgs)?).await?;
	let (responses, _) = parse_incoming(&body)?;
	let mut out: Vec<Option<Message>> = std::iter::repeat_with(|| None).take(msgs.len()).collect();
	for response in responses {
		if response.kind() != MessageKind::Response {
			continue;
		}
		if let Some(slot) = response.id.as_ref().and_then(Id::as_number).and_then(|id| slots.get(&id)).copied() {
			out[slot] = Some(response);
		}
	}
	Ok(out)
}

pub(crate) async fn notify(
	transport: &Arc<dyn HttpTransport>,
	method: String,
	params: Option<Box<RawValue>>,
) -> Result<(), Error> {
	let msg = Message::notification(method, params);
	transport.post(serde_json::to_string(&msg)?).await?;
	Ok(())
}
