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

//! HTTP client for the duplexrpc engine.
//!
//! HTTP is the deliberately degraded transport: every call is one POST, and
//! [`Client::subscribe`](duplexrpc_core::client::Client::subscribe) answers
//! [`Error::NotificationsUnsupported`]. The engine's fast path bypasses the
//! dispatcher entirely; this crate only supplies the hyper round trip.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

mod transport;

use std::sync::Arc;
use std::time::Duration;

use duplexrpc_core::client::{Client, ClientBuilder};
use duplexrpc_core::Error;

pub use duplexrpc_core::client::{BatchRequest, BatchResponse};
pub use transport::HttpTransportClient;
/// Wire types, re-exported for callers building params by hand.
pub use duplexrpc_types as types;

/// Default limit on outgoing request bodies (10 MiB).
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: u32 = 10 * 1024 * 1024;

/// Builder for HTTP-backed clients.
#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
	request_timeout: Duration,
	max_request_body_size: u32,
}

impl Default for HttpClientBuilder {
	fn default() -> Self {
		Self {
			request_timeout: duplexrpc_core::client::DEFAULT_REQUEST_TIMEOUT,
			max_request_body_size: DEFAULT_MAX_REQUEST_BODY_SIZE,
		}
	}
}

impl HttpClientBuilder {
	/// Builder with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// How long calls wait for their response.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Refuses to send bodies beyond this size.
	pub fn max_request_body_size(mut self, max: u32) -> Self {
		self.max_request_body_size = max;
		self
	}

	/// Builds a client POSTing to `target`, an `http://` url.
	pub fn build(self, target: impl AsRef<str>) -> Result<Client, Error> {
		let transport = HttpTransportClient::new(target.as_ref(), self.max_request_body_size)?;
		Ok(ClientBuilder::new().request_timeout(self.request_timeout).build_with_http(Arc::new(transport)))
	}
}
