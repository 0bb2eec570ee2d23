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

//! WebSocket client: the core async client wired to the soketto transport.
//!
//! The returned [`Client`] supports calls, batches, notifications and
//! subscriptions. After a connection failure the next outbound operation
//! redials the same url exactly once; open subscriptions are not replayed,
//! their error slot fires and callers resubscribe.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use duplexrpc_client_transport::WsTransportBuilder;
use duplexrpc_core::client::{Client, ClientBuilder, Dial};
use duplexrpc_core::codec::Codec;
use duplexrpc_core::Error;

pub use duplexrpc_client_transport::{WsCodec, WsHandshakeError};
pub use duplexrpc_core::client::{BatchRequest, BatchResponse, ClientSubscription};
/// Wire types, re-exported for callers building params by hand.
pub use duplexrpc_types as types;

/// Builder for websocket-backed clients.
#[derive(Debug, Clone)]
pub struct WsClientBuilder {
	request_timeout: Duration,
	connection_timeout: Duration,
	max_subscription_buffer: usize,
}

impl Default for WsClientBuilder {
	fn default() -> Self {
		Self {
			request_timeout: duplexrpc_core::client::DEFAULT_REQUEST_TIMEOUT,
			connection_timeout: Duration::from_secs(10),
			max_subscription_buffer: duplexrpc_core::client::DEFAULT_SUBSCRIPTION_BUFFER,
		}
	}
}

impl WsClientBuilder {
	/// Builder with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// How long calls wait for their response.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Limit on connect plus websocket handshake, per dial.
	pub fn connection_timeout(mut self, timeout: Duration) -> Self {
		self.connection_timeout = timeout;
		self
	}

	/// Per-subscription buffer limit before slow consumers are dropped.
	pub fn max_subscription_buffer(mut self, max: usize) -> Self {
		self.max_subscription_buffer = max;
		self
	}

	/// Connects to `url` (`ws://host:port/path`) and returns a client that
	/// redials the same url when the connection fails.
	pub async fn build(self, url: impl AsRef<str>) -> Result<Client, Error> {
		let url = url.as_ref().to_owned();
		let connection_timeout = self.connection_timeout;

		let initial = WsTransportBuilder::new()
			.connection_timeout(connection_timeout)
			.build(&url)
			.await
			.map_err(Error::transport)?;

		let dial: Dial = Box::new(move || {
			let url = url.clone();
			async move {
				let codec = WsTransportBuilder::new()
					.connection_timeout(connection_timeout)
					.build(&url)
					.await
					.map_err(Error::transport)?;
				Ok(Arc::new(codec) as Arc<dyn Codec>)
			}
			.boxed()
		});

		Ok(ClientBuilder::new()
			.request_timeout(self.request_timeout)
			.max_subscription_buffer(self.max_subscription_buffer)
			.build_connected(Arc::new(initial), dial))
	}
}
