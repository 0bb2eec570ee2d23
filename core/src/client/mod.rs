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

//! The unified client: calls, batches, notifications and subscriptions over
//! a stream codec, or degraded one-shot exchanges over HTTP.

mod async_client;
mod http;
mod manager;
mod subscription;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};

use duplexrpc_types::Message;

use crate::codec::Codec;
use crate::error::Error;
use crate::traits::ToRpcParams;

use async_client::{BackgroundTask, FrontToBack};

pub use async_client::Dial;
pub use http::HttpTransport;
pub use subscription::ClientSubscription;

/// Default limit of undelivered notifications buffered per subscription.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 20_000;
/// Default time to wait for a response before a call gives up.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON-RPC client.
///
/// Stream-backed clients run a dispatcher task plus one reader per live
/// connection and support the full surface, including subscriptions and a
/// reconnecting dial. HTTP-backed clients exchange one request per call and
/// answer [`Error::NotificationsUnsupported`] to
/// [`subscribe`](Client::subscribe).
#[derive(Debug)]
pub struct Client {
	inner: Inner,
	request_timeout: Duration,
	max_subscription_buffer: usize,
}

#[derive(Debug)]
enum Inner {
	Stream { to_back: mpsc::UnboundedSender<FrontToBack> },
	Http { transport: Arc<dyn HttpTransport>, next_id: AtomicU64 },
}

/// Configuration for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
	request_timeout: Duration,
	max_subscription_buffer: usize,
}

impl Default for ClientBuilder {
	fn default() -> Self {
		Self { request_timeout: DEFAULT_REQUEST_TIMEOUT, max_subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER }
	}
}

impl ClientBuilder {
	/// Builder with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// How long calls wait for their response.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// How many undelivered notifications a subscription buffers before it
	/// is dropped with [`Error::SubscriptionQueueOverflow`].
	pub fn max_subscription_buffer(mut self, max: usize) -> Self {
		self.max_subscription_buffer = max;
		self
	}

	/// Client over an already-connected codec; the connection is not
	/// re-established when it fails.
	pub fn build_with_codec(self, codec: Arc<dyn Codec>) -> Client {
		self.build_stream(Some(codec), None)
	}

	/// Client over a dial function; connects lazily on first use and redials
	/// once per send after the connection failed.
	pub fn build_with_dial(self, dial: Dial) -> Client {
		self.build_stream(None, Some(dial))
	}

	/// Client over an established codec with a dial function for later
	/// reconnects.
	pub fn build_connected(self, codec: Arc<dyn Codec>, dial: Dial) -> Client {
		self.build_stream(Some(codec), Some(dial))
	}

	fn build_stream(self, codec: Option<Arc<dyn Codec>>, dial: Option<Dial>) -> Client {
		let (to_back, from_front) = mpsc::unbounded_channel();
		tokio::spawn(BackgroundTask::new(codec, dial, from_front).run());
		Client {
			inner: Inner::Stream { to_back },
			request_timeout: self.request_timeout,
			max_subscription_buffer: self.max_subscription_buffer,
		}
	}

	/// Client over a one-shot HTTP transport.
	pub fn build_with_http(self, transport: Arc<dyn HttpTransport>) -> Client {
		Client {
			inner: Inner::Http { transport, next_id: AtomicU64::new(0) },
			request_timeout: self.request_timeout,
			max_subscription_buffer: self.max_subscription_buffer,
		}
	}
}

impl Client {
	/// Shorthand for [`ClientBuilder`].
	pub fn builder() -> ClientBuilder {
		ClientBuilder::default()
	}

	/// Performs one call and decodes the `result` member into `R`.
	///
	/// A success response whose result is `null` (or absent) yields
	/// [`Error::NoResult`] unless `R` can absorb `null`, e.g. an `Option`.
	pub async fn call<R, P>(&self, method: &str, params: P) -> Result<R, Error>
	where
		R: DeserializeOwned,
		P: ToRpcParams,
	{
		let params = params.to_rpc_params()?;
		let response = match &self.inner {
			Inner::Stream { to_back } => {
				let (send_back, rx) = oneshot::channel();
				to_back
					.send(FrontToBack::Request { method: method.to_owned(), params, send_back })
					.map_err(|_| Error::ClientQuit)?;
				self.await_response(rx).await??
			}
			Inner::Http { transport, next_id } => {
				self.with_timeout(http::call(transport, next_id, method.to_owned(), params)).await??
			}
		};
		decode_result(response)
	}

	/// Sends a notification; no id, no response, no registration.
	pub async fn notify<P: ToRpcParams>(&self, method: &str, params: P) -> Result<(), Error> {
		let params = params.to_rpc_params()?;
		match &self.inner {
			Inner::Stream { to_back } => {
				let (send_back, rx) = oneshot::channel();
				to_back
					.send(FrontToBack::Notification { method: method.to_owned(), params, send_back })
					.map_err(|_| Error::ClientQuit)?;
				self.await_response(rx).await??;
				Ok(())
			}
			Inner::Http { transport, .. } => self.with_timeout(http::notify(transport, method.to_owned(), params)).await?,
		}
	}

	/// Sends every request of the batch as one wire value and waits for all
	/// of them to be answered. Elements succeed and fail independently; a
	/// transport failure aborts the whole batch with that error.
	pub async fn batch_call(&self, batch: BatchRequest) -> Result<BatchResponse, Error> {
		if batch.requests.is_empty() {
			return Ok(BatchResponse { responses: Vec::new() });
		}
		let responses = match &self.inner {
			Inner::Stream { to_back } => {
				let (send_back, rx) = oneshot::channel();
				to_back
					.send(FrontToBack::Batch { requests: batch.requests, send_back })
					.map_err(|_| Error::ClientQuit)?;
				self.await_response(rx).await??
			}
			Inner::Http { transport, next_id } => {
				self.with_timeout(http::batch(transport, next_id, batch.requests)).await??
			}
		};
		let responses = responses
			.into_iter()
			.map(|maybe| match maybe {
				None => Err(Error::NoResult),
				Some(msg) => match msg.error {
					Some(err) => Err(Error::Call(err)),
					None => Ok(msg.result.expect("a response carries result or error; qed")),
				},
			})
			.collect();
		Ok(BatchResponse { responses })
	}

	/// Opens a subscription named `subscription` in `namespace`; the server
	/// side is reached as `<namespace>_subscribe` with the name as first
	/// argument. Values arrive typed and in order on the returned handle.
	pub async fn subscribe<N, P>(
		&self,
		namespace: &str,
		subscription: &str,
		params: P,
	) -> Result<ClientSubscription<N>, Error>
	where
		N: DeserializeOwned + Send + 'static,
		P: ToRpcParams,
	{
		match &self.inner {
			Inner::Http { .. } => Err(Error::NotificationsUnsupported),
			Inner::Stream { to_back } => {
				let params = params.to_rpc_params()?;
				let (send_back, rx) = oneshot::channel();
				to_back
					.send(FrontToBack::Subscribe {
						namespace: namespace.to_owned(),
						name: subscription.to_owned(),
						params,
						send_back,
					})
					.map_err(|_| Error::ClientQuit)?;
				let (sub_id, in_rx) = self.await_response(rx).await??;
				Ok(ClientSubscription::new(sub_id, namespace.to_owned(), in_rx, self.max_subscription_buffer, to_back.clone()))
			}
		}
	}

	/// Closes the client. Pending calls fail with [`Error::ClientQuit`];
	/// open subscriptions end without an error.
	pub fn close(&self) {
		if let Inner::Stream { to_back } = &self.inner {
			let _ = to_back.send(FrontToBack::Close);
		}
	}

	async fn await_response<T>(&self, rx: oneshot::Receiver<Result<T, Error>>) -> Result<Result<T, Error>, Error> {
		match self.with_timeout(rx).await? {
			// Dispatcher gone means the client was closed underneath us.
			Err(_) => Err(Error::ClientQuit),
			Ok(result) => Ok(result),
		}
	}

	async fn with_timeout<F: std::future::Future>(&self, fut: F) -> Result<F::Output, Error> {
		tokio::time::timeout(self.request_timeout, fut).await.map_err(|_| Error::RequestTimeout)
	}
}

fn decode_result<R: DeserializeOwned>(msg: Message) -> Result<R, Error> {
	if let Some(err) = msg.error {
		return Err(Error::Call(err));
	}
	let text = msg.result.as_deref().map(|raw| raw.get()).unwrap_or("null");
	serde_json::from_str(text).map_err(|e| if text == "null" { Error::NoResult } else { Error::ParseError(e) })
}

/// An ordered set of calls sent as one wire value.
#[derive(Debug, Default)]
pub struct BatchRequest {
	requests: Vec<(String, Option<Box<RawValue>>)>,
}

impl BatchRequest {
	/// An empty batch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends one call.
	pub fn insert(&mut self, method: impl Into<String>, params: impl ToRpcParams) -> Result<(), Error> {
		self.requests.push((method.into(), params.to_rpc_params()?));
		Ok(())
	}

	/// Number of calls in the batch.
	pub fn len(&self) -> usize {
		self.requests.len()
	}

	/// Whether the batch holds no calls.
	pub fn is_empty(&self) -> bool {
		self.requests.is_empty()
	}
}

/// Per-element outcomes of a batch, in request order.
///
/// An element is the raw `result` payload, [`Error::Call`] with the
/// server-supplied error object, or [`Error::NoResult`] when the server
/// never answered that id.
#[derive(Debug)]
pub struct BatchResponse {
	responses: Vec<Result<Box<RawValue>, Error>>,
}

impl BatchResponse {
	/// Number of elements; equals the number of requests sent.
	pub fn len(&self) -> usize {
		self.responses.len()
	}

	/// Whether the batch was empty.
	pub fn is_empty(&self) -> bool {
		self.responses.is_empty()
	}

	/// Borrows the per-element outcomes.
	pub fn responses(&self) -> &[Result<Box<RawValue>, Error>] {
		&self.responses
	}

	/// Decodes the element at `index`.
	pub fn decode<R: DeserializeOwned>(&self, index: usize) -> Result<R, Error> {
		match self.responses.get(index) {
			Some(Ok(raw)) => {
				serde_json::from_str(raw.get()).map_err(|e| if raw.get() == "null" { Error::NoResult } else { Error::ParseError(e) })
			}
			Some(Err(Error::Call(err))) => Err(Error::Call(err.clone())),
			Some(Err(_)) | None => Err(Error::NoResult),
		}
	}
}

impl IntoIterator for BatchResponse {
	type Item = Result<Box<RawValue>, Error>;
	type IntoIter = std::vec::IntoIter<Self::Item>;

	fn into_iter(self) -> Self::IntoIter {
		self.responses.into_iter()
	}
}
