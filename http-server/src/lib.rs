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

//! HTTP server for the duplexrpc engine.
//!
//! Each POST body is dispatched as one isolated exchange: method calls and
//! batches work, subscriptions do not exist on this transport. Bodies
//! beyond the configured limit are answered with 413 before they are read
//! to the end.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

mod response;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use duplexrpc_core::server::Server;
use duplexrpc_core::Error;

/// Default limit on request bodies (10 MiB).
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: u32 = 10 * 1024 * 1024;

/// Builder for [`HttpServer`].
#[derive(Debug, Clone)]
pub struct HttpServerBuilder {
	max_request_body_size: u32,
}

impl Default for HttpServerBuilder {
	fn default() -> Self {
		Self { max_request_body_size: DEFAULT_MAX_REQUEST_BODY_SIZE }
	}
}

impl HttpServerBuilder {
	/// Builder with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests with bigger bodies are answered with 413.
	pub fn max_request_body_size(mut self, max: u32) -> Self {
		self.max_request_body_size = max;
		self
	}

	/// Binds to `addr` and starts serving `rpc`.
	pub async fn build(self, addr: SocketAddr, rpc: Server) -> Result<HttpServer, Error> {
		let inner = Arc::new(Inner { rpc, max_request_body_size: self.max_request_body_size });
		let make_service = make_service_fn(move |conn: &AddrStream| {
			let inner = inner.clone();
			let remote = conn.remote_addr();
			async move {
				Ok::<_, Infallible>(service_fn(move |request| {
					let inner = inner.clone();
					async move { Ok::<_, Infallible>(handle_request(inner, remote, request).await) }
				}))
			}
		});

		let server = hyper::Server::try_bind(&addr).map_err(Error::transport)?.serve(make_service);
		let local_addr = server.local_addr();
		tracing::debug!("[HttpServerBuilder::build] listening on {}", local_addr);

		let (stop_tx, stop_rx) = oneshot::channel::<()>();
		let graceful = server.with_graceful_shutdown(async {
			let _ = stop_rx.await;
		});
		let handle = tokio::spawn(async move {
			if let Err(e) = graceful.await {
				tracing::error!("[HttpServer] server error: {}", e);
			}
		});

		Ok(HttpServer { local_addr, stop: Some(stop_tx), handle })
	}
}

/// A running HTTP server.
#[derive(Debug)]
pub struct HttpServer {
	local_addr: SocketAddr,
	stop: Option<oneshot::Sender<()>>,
	handle: JoinHandle<()>,
}

impl HttpServer {
	/// The bound address, useful with port 0.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Stops accepting connections and waits for in-flight requests.
	pub async fn stop(mut self) {
		if let Some(stop) = self.stop.take() {
			let _ = stop.send(());
		}
		let _ = (&mut self.handle).await;
	}
}

#[derive(Debug)]
struct Inner {
	rpc: Server,
	max_request_body_size: u32,
}

async fn handle_request(inner: Arc<Inner>, remote: SocketAddr, request: Request<Body>) -> Response<Body> {
	if request.method() != Method::POST {
		return response::method_not_allowed();
	}
	if !content_type_is_json(&request) {
		return response::unsupported_content_type();
	}
	// The header is a cheap early reject; the read loop below enforces the
	// limit for chunked bodies too.
	let claimed = request.body().size_hint().lower();
	if claimed > inner.max_request_body_size as u64 {
		return response::too_large();
	}

	let mut body = request.into_body();
	let mut bytes: Vec<u8> = Vec::with_capacity(claimed as usize);
	while let Some(chunk) = body.data().await {
		let chunk = match chunk {
			Ok(chunk) => chunk,
			Err(e) => {
				tracing::debug!("[HttpServer] body read from {} failed: {}", remote, e);
				return response::malformed();
			}
		};
		if bytes.len() + chunk.len() > inner.max_request_body_size as usize {
			return response::too_large();
		}
		bytes.extend_from_slice(&chunk);
	}
	let body = match String::from_utf8(bytes) {
		Ok(body) => body,
		Err(_) => return response::malformed(),
	};

	tracing::trace!("[HttpServer] {} byte request from {}", body.len(), remote);
	match inner.rpc.raw_json_request(&body).await {
		Some(reply) => response::ok_json(reply),
		None => response::ok_empty(),
	}
}

fn content_type_is_json(request: &Request<Body>) -> bool {
	request
		.headers()
		.get(hyper::header::CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.map(|value| value.to_ascii_lowercase().starts_with("application/json"))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use duplexrpc_core::server::Module;
	use duplexrpc_core::Error as RpcError;
	use duplexrpc_http_client::HttpClientBuilder;

	fn rpc() -> Server {
		let mut module = Module::new("test", ()).unwrap();
		module.register_method("echo", |params, _| params.one::<String>());
		let mut server = Server::new();
		server.merge(module);
		server
	}

	#[tokio::test]
	async fn end_to_end_call() {
		let server = HttpServerBuilder::new().build("127.0.0.1:0".parse().unwrap(), rpc()).await.unwrap();
		let url = format!("http://{}", server.local_addr());

		let client = HttpClientBuilder::new().build(&url).unwrap();
		let reply: String = client.call("test_echo", ("over http",)).await.unwrap();
		assert_eq!(reply, "over http");

		assert!(matches!(
			client.subscribe::<u64, _>("test", "anything", ()).await,
			Err(RpcError::NotificationsUnsupported)
		));

		server.stop().await;
	}

	#[tokio::test]
	async fn oversized_bodies_get_413() {
		let server = HttpServerBuilder::new()
			.max_request_body_size(64)
			.build("127.0.0.1:0".parse().unwrap(), rpc())
			.await
			.unwrap();
		let url = format!("http://{}", server.local_addr());

		// Small enough to pass the client-side check; the 413 comes from
		// the server.
		let client = HttpClientBuilder::new().build(&url).unwrap();
		let big = "x".repeat(256);
		let err = client.call::<String, _>("test_echo", (big,)).await.unwrap_err();
		assert!(matches!(err, RpcError::RequestTooLarge));

		server.stop().await;
	}
}
