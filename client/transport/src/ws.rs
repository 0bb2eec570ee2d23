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
use std::time::Duration;

use async_trait::async_trait;
use http::Uri;
use soketto::connection;
use soketto::handshake::{Client as WsHandshake, ServerResponse};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use duplexrpc_core::codec::{Codec, CodecError, Incoming};
use duplexrpc_types::parse_incoming;

type WsStream = Compat<TcpStream>;

/// A websocket connection speaking one JSON value per text frame.
pub struct WsCodec {
	sender: Mutex<connection::Sender<WsStream>>,
	receiver: Mutex<connection::Receiver<WsStream>>,
	closed_flag: AtomicBool,
	closed_tx: watch::Sender<bool>,
	remote: String,
}

/// Failure to establish a websocket connection.
#[derive(Debug, thiserror::Error)]
pub enum WsHandshakeError {
	/// The url was not usable for a plain websocket connection.
	#[error("invalid websocket url: {0}")]
	Url(String),
	/// Connecting the socket failed.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	/// The websocket upgrade failed.
	#[error("websocket handshake failed: {0}")]
	Handshake(#[from] soketto::handshake::Error),
	/// The server answered the upgrade with a non-success status.
	#[error("server rejected the websocket handshake (status {status_code})")]
	Rejected {
		/// HTTP status code of the rejection.
		status_code: u16,
	},
	/// The connection attempt timed out.
	#[error("connection timed out")]
	Timeout,
}

/// Dials `ws://` endpoints.
///
/// `wss://` is refused here: TLS termination is the embedding application's
/// concern (local proxy, sidecar, or a custom codec).
#[derive(Debug, Clone)]
pub struct WsTransportBuilder {
	connection_timeout: Duration,
}

impl Default for WsTransportBuilder {
	fn default() -> Self {
		Self { connection_timeout: Duration::from_secs(10) }
	}
}

impl WsTransportBuilder {
	/// Builder with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Limit on the TCP connect plus handshake.
	pub fn connection_timeout(mut self, timeout: Duration) -> Self {
		self.connection_timeout = timeout;
		self
	}

	/// Connects and upgrades, returning a ready codec.
	pub async fn build(self, url: impl AsRef<str>) -> Result<WsCodec, WsHandshakeError> {
		let uri: Uri = url.as_ref().parse().map_err(|_| WsHandshakeError::Url(format!("not a url: {}", url.as_ref())))?;
		match uri.scheme_str() {
			Some("ws") => {}
			Some("wss") => {
				return Err(WsHandshakeError::Url("wss is not terminated here, connect via a TLS-terminating proxy".into()))
			}
			_ => return Err(WsHandshakeError::Url(format!("unsupported scheme in {}", url.as_ref()))),
		}
		let host = uri.host().ok_or_else(|| WsHandshakeError::Url("missing host".into()))?.to_owned();
		let port = uri.port_u16().unwrap_or(80);
		let path = uri.path_and_query().map(|p| p.as_str().to_owned()).unwrap_or_else(|| "/".into());
		let remote = format!("{}:{}", host, port);
		tracing::debug!("[WsTransportBuilder::build] connecting to {}", remote);

		let socket = tokio::time::timeout(self.connection_timeout, TcpStream::connect((host.as_str(), port)))
			.await
			.map_err(|_| WsHandshakeError::Timeout)??;
		socket.set_nodelay(true)?;

		let mut handshake = WsHandshake::new(socket.compat(), &host, &path);
		match tokio::time::timeout(self.connection_timeout, handshake.handshake())
			.await
			.map_err(|_| WsHandshakeError::Timeout)??
		{
			ServerResponse::Accepted { .. } => {}
			ServerResponse::Redirect { status_code, .. } | ServerResponse::Rejected { status_code } => {
				return Err(WsHandshakeError::Rejected { status_code })
			}
		}
		let (sender, receiver) = handshake.into_builder().finish();
		let (closed_tx, _) = watch::channel(false);
		Ok(WsCodec {
			sender: Mutex::new(sender),
			receiver: Mutex::new(receiver),
			closed_flag: AtomicBool::new(false),
			closed_tx,
			remote,
		})
	}
}

impl std::fmt::Debug for WsCodec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WsCodec").field("remote", &self.remote).finish()
	}
}

fn map_ws_error(e: connection::Error) -> CodecError {
	match e {
		connection::Error::Closed => CodecError::Closed,
		connection::Error::Io(e) => CodecError::Io(e),
		other => CodecError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
	}
}

#[async_trait]
impl Codec for WsCodec {
	async fn read_batch(&self) -> Result<Incoming, CodecError> {
		let mut receiver = self.receiver.lock().await;
		let mut closed = self.closed_tx.subscribe();
		if self.closed_flag.load(Ordering::Acquire) {
			return Err(CodecError::Closed);
		}
		let mut data = Vec::new();
		tokio::select! {
			received = receiver.receive_data(&mut data) => {
				received.map_err(map_ws_error)?;
				let raw = String::from_utf8(data)
					.map_err(|e| CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
				let (msgs, batch) = parse_incoming(&raw)?;
				Ok(Incoming { msgs, batch })
			}
			_ = closed.changed() => Err(CodecError::Closed),
		}
	}

	async fn write(&self, json: String) -> Result<(), CodecError> {
		if self.closed_flag.load(Ordering::Acquire) {
			return Err(CodecError::Closed);
		}
		let mut sender = self.sender.lock().await;
		sender.send_text(json).await.map_err(map_ws_error)?;
		sender.flush().await.map_err(map_ws_error)
	}

	fn close(&self) {
		if !self.closed_flag.swap(true, Ordering::AcqRel) {
			let _ = self.closed_tx.send(true);
		}
	}

	fn remote_addr(&self) -> &str {
		&self.remote
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn rejects_non_ws_schemes() {
		assert!(matches!(
			WsTransportBuilder::new().build("http://127.0.0.1:80").await,
			Err(WsHandshakeError::Url(_))
		));
		assert!(matches!(WsTransportBuilder::new().build("not a url").await, Err(WsHandshakeError::Url(_))));
	}

	#[tokio::test]
	async fn refuses_tls_urls() {
		let err = WsTransportBuilder::new().build("wss://example.com").await.unwrap_err();
		assert!(matches!(err, WsHandshakeError::Url(_)));
	}
}
