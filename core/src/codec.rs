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
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};

use duplexrpc_types::{parse_incoming, Message};

/// Failure of a codec operation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
	/// The connection is gone: closed locally, closed by the peer, or the
	/// byte stream ended.
	#[error("connection closed")]
	Closed,
	/// Reading or writing the underlying stream failed.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	/// The peer sent something that is not valid JSON.
	#[error("invalid JSON: {0}")]
	Parse(#[from] serde_json::Error),
}

/// One decoded wire value.
#[derive(Debug)]
pub struct Incoming {
	/// The decoded frames; one element unless `batch` is set.
	pub msgs: Vec<Message>,
	/// Whether the wire value was an array. Replies must be written in the
	/// same form the request arrived in.
	pub batch: bool,
}

/// Full-duplex reader/writer of whole JSON values; one per connection.
///
/// Implementations must tolerate concurrent `read_batch` and `write`, and
/// `close` must be idempotent and callable from any task. A close during a
/// pending read makes that read return [`CodecError::Closed`] promptly.
#[async_trait]
pub trait Codec: Send + Sync + 'static {
	/// Reads the next wire value, blocking until one is available.
	async fn read_batch(&self) -> Result<Incoming, CodecError>;

	/// Writes one serialized JSON value.
	async fn write(&self, json: String) -> Result<(), CodecError>;

	/// Tears the connection down.
	fn close(&self);

	/// Peer description for log context.
	fn remote_addr(&self) -> &str {
		""
	}
}

/// Close signal shared by both directions of a connection.
#[derive(Debug)]
struct CloseSignal {
	flag: AtomicBool,
	tx: watch::Sender<bool>,
}

impl CloseSignal {
	fn new() -> Arc<Self> {
		let (tx, _) = watch::channel(false);
		Arc::new(Self { flag: AtomicBool::new(false), tx })
	}

	fn close(&self) {
		if !self.flag.swap(true, Ordering::AcqRel) {
			let _ = self.tx.send(true);
		}
	}

	fn is_closed(&self) -> bool {
		self.flag.load(Ordering::Acquire)
	}

	// Subscribe before checking the flag: a close landing in between is then
	// guaranteed to wake `changed()`.
	fn watch(&self) -> watch::Receiver<bool> {
		self.tx.subscribe()
	}
}

/// In-process transport: a pair of connected codecs backed by channels.
///
/// The workhorse for in-process servers and tests. Closing either end closes
/// the connection for both.
#[derive(Debug)]
pub struct MemoryCodec {
	tx: mpsc::UnboundedSender<String>,
	rx: Mutex<mpsc::UnboundedReceiver<String>>,
	shared: Arc<CloseSignal>,
}

/// Creates two connected in-process codecs.
pub fn memory_pair() -> (MemoryCodec, MemoryCodec) {
	let (left_tx, right_rx) = mpsc::unbounded_channel();
	let (right_tx, left_rx) = mpsc::unbounded_channel();
	let shared = CloseSignal::new();
	let left = MemoryCodec { tx: left_tx, rx: Mutex::new(left_rx), shared: shared.clone() };
	let right = MemoryCodec { tx: right_tx, rx: Mutex::new(right_rx), shared };
	(left, right)
}

#[async_trait]
impl Codec for MemoryCodec {
	async fn read_batch(&self) -> Result<Incoming, CodecError> {
		let mut rx = self.rx.lock().await;
		let mut closed = self.shared.watch();
		if self.shared.is_closed() {
			return Err(CodecError::Closed);
		}
		tokio::select! {
			maybe = rx.recv() => match maybe {
				Some(raw) => {
					let (msgs, batch) = parse_incoming(&raw)?;
					Ok(Incoming { msgs, batch })
				}
				None => Err(CodecError::Closed),
			},
			_ = closed.changed() => Err(CodecError::Closed),
		}
	}

	async fn write(&self, json: String) -> Result<(), CodecError> {
		if self.shared.is_closed() {
			return Err(CodecError::Closed);
		}
		self.tx.send(json).map_err(|_| CodecError::Closed)
	}

	fn close(&self) {
		self.shared.close();
	}

	fn remote_addr(&self) -> &str {
		"memory"
	}
}

/// Codec over any byte stream, for local sockets and named pipes.
///
/// Values are framed by JSON itself: the reader parses incrementally and
/// yields each complete top-level value as it arrives, so a single message
/// has no logical size limit.
#[derive(Debug)]
pub struct StreamCodec<R, W> {
	reader: Mutex<StreamReader<R>>,
	writer: Mutex<W>,
	shared: Arc<CloseSignal>,
	remote: String,
}

#[derive(Debug)]
struct StreamReader<R> {
	io: R,
	buf: Vec<u8>,
}

impl<R, W> StreamCodec<R, W>
where
	R: AsyncRead + Unpin + Send + Sync + 'static,
	W: AsyncWrite + Unpin + Send + Sync + 'static,
{
	/// Creates a codec over separate read and write halves.
	pub fn new(read: R, write: W, remote: impl Into<String>) -> Self {
		Self {
			reader: Mutex::new(StreamReader { io: read, buf: Vec::new() }),
			writer: Mutex::new(write),
			shared: CloseSignal::new(),
			remote: remote.into(),
		}
	}
}

impl<T> StreamCodec<ReadHalf<T>, WriteHalf<T>>
where
	T: AsyncRead + AsyncWrite + Send + Sync + 'static,
{
	/// Creates a codec over a combined duplex stream.
	pub fn from_duplex(io: T, remote: impl Into<String>) -> Self {
		let (read, write) = tokio::io::split(io);
		Self::new(read, write, remote)
	}
}

/// Returns the byte length of the first complete JSON value in `buf`, if one
/// has fully arrived.
fn complete_value_len(buf: &[u8]) -> Result<Option<usize>, CodecError> {
	if buf.iter().all(|b| b.is_ascii_whitespace()) {
		return Ok(None);
	}
	let mut iter = serde_json::Deserializer::from_slice(buf).into_iter::<serde::de::IgnoredAny>();
	match iter.next() {
		Some(Ok(_)) => Ok(Some(iter.byte_offset())),
		Some(Err(e)) if e.is_eof() => Ok(None),
		Some(Err(e)) => Err(CodecError::Parse(e)),
		None => Ok(None),
	}
}

#[async_trait]
impl<R, W> Codec for StreamCodec<R, W>
where
	R: AsyncRead + Unpin + Send + Sync + 'static,
	W: AsyncWrite + Unpin + Send + Sync + 'static,
{
	async fn read_batch(&self) -> Result<Incoming, CodecError> {
		let mut reader = self.reader.lock().await;
		let mut closed = self.shared.watch();
		if self.shared.is_closed() {
			return Err(CodecError::Closed);
		}
		loop {
			if let Some(len) = complete_value_len(&reader.buf)? {
				let bytes: Vec<u8> = reader.buf.drain(..len).collect();
				let raw = String::from_utf8(bytes)
					.map_err(|e| CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
				let (msgs, batch) = parse_incoming(raw.trim())?;
				return Ok(Incoming { msgs, batch });
			}
			let StreamReader { io, buf } = &mut *reader;
			tokio::select! {
				read = io.read_buf(buf) => {
					if read? == 0 {
						return Err(CodecError::Closed);
					}
				}
				_ = closed.changed() => return Err(CodecError::Closed),
			}
		}
	}

	async fn write(&self, json: String) -> Result<(), CodecError> {
		if self.shared.is_closed() {
			return Err(CodecError::Closed);
		}
		let mut writer = self.writer.lock().await;
		writer.write_all(json.as_bytes()).await?;
		writer.write_all(b"\n").await?;
		writer.flush().await?;
		Ok(())
	}

	fn close(&self) {
		self.shared.close();
	}

	fn remote_addr(&self) -> &str {
		&self.remote
	}
}

/// Codec wrapping a single request/response exchange, the HTTP shape: one
/// read yields the request body, the first write is kept as the response.
#[derive(Debug, Default)]
pub struct OneShotCodec {
	request: parking_lot::Mutex<Option<String>>,
	response: parking_lot::Mutex<Option<String>>,
}

impl OneShotCodec {
	/// Wraps a request body.
	pub fn new(body: impl Into<String>) -> Self {
		Self { request: parking_lot::Mutex::new(Some(body.into())), response: parking_lot::Mutex::new(None) }
	}

	/// Takes the reply written so far; `None` when the request produced no
	/// response (a notification).
	pub fn take_response(&self) -> Option<String> {
		self.response.lock().take()
	}
}

#[async_trait]
impl Codec for OneShotCodec {
	async fn read_batch(&self) -> Result<Incoming, CodecError> {
		match self.request.lock().take() {
			Some(raw) => {
				let (msgs, batch) = parse_incoming(&raw)?;
				Ok(Incoming { msgs, batch })
			}
			None => Err(CodecError::Closed),
		}
	}

	async fn write(&self, json: String) -> Result<(), CodecError> {
		let mut response = self.response.lock();
		if response.is_none() {
			*response = Some(json);
		}
		Ok(())
	}

	fn close(&self) {}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn memory_pair_round_trip() {
		let (left, right) = memory_pair();
		left.write(r#"{"jsonrpc":"2.0","id":1,"method":"a_b"}"#.into()).await.unwrap();
		let incoming = right.read_batch().await.unwrap();
		assert!(!incoming.batch);
		assert_eq!(incoming.msgs[0].method.as_deref(), Some("a_b"));
	}

	#[tokio::test]
	async fn memory_close_aborts_pending_read() {
		let (left, right) = memory_pair();
		let reader = tokio::spawn(async move { right.read_batch().await });
		tokio::task::yield_now().await;
		left.close();
		let res = tokio::time::timeout(std::time::Duration::from_secs(1), reader).await.unwrap().unwrap();
		assert!(matches!(res, Err(CodecError::Closed)));
	}

	#[tokio::test]
	async fn memory_close_is_idempotent_and_fails_writes() {
		let (left, right) = memory_pair();
		left.close();
		left.close();
		assert!(matches!(left.write("{}".into()).await, Err(CodecError::Closed)));
		assert!(matches!(right.write("{}".into()).await, Err(CodecError::Closed)));
	}

	#[tokio::test]
	async fn memory_parse_error_is_reported() {
		let (left, right) = memory_pair();
		left.write("{not json".into()).await.unwrap();
		assert!(matches!(right.read_batch().await, Err(CodecError::Parse(_))));
	}

	#[tokio::test]
	async fn stream_codec_frames_concatenated_values() {
		let (client, server) = tokio::io::duplex(256);
		let client = StreamCodec::from_duplex(client, "test");
		let server = StreamCodec::from_duplex(server, "test");

		// Two values in one write, no separator beyond JSON itself.
		client
			.write(r#"{"jsonrpc":"2.0","id":1,"method":"a_b"}"#.into())
			.await
			.unwrap();
		client
			.write(r#"[{"jsonrpc":"2.0","id":2,"method":"a_c"}]"#.into())
			.await
			.unwrap();

		let first = server.read_batch().await.unwrap();
		assert!(!first.batch);
		assert_eq!(first.msgs[0].method.as_deref(), Some("a_b"));

		let second = server.read_batch().await.unwrap();
		assert!(second.batch);
		assert_eq!(second.msgs[0].method.as_deref(), Some("a_c"));
	}

	#[tokio::test]
	async fn stream_codec_handles_split_frames() {
		use tokio::io::AsyncWriteExt;

		let (mut raw, server) = tokio::io::duplex(256);
		let server = StreamCodec::from_duplex(server, "test");

		raw.write_all(br#"{"jsonrpc":"2.0","#).await.unwrap();
		let pending = tokio::spawn(async move { server.read_batch().await });
		tokio::task::yield_now().await;
		raw.write_all(br#""id":1,"method":"a_b"}"#).await.unwrap();

		let incoming = pending.await.unwrap().unwrap();
		assert_eq!(incoming.msgs[0].method.as_deref(), Some("a_b"));
	}

	#[tokio::test]
	async fn one_shot_codec_reads_once() {
		let codec = OneShotCodec::new(r#"{"jsonrpc":"2.0","id":1,"method":"a_b"}"#);
		assert!(codec.read_batch().await.is_ok());
		assert!(matches!(codec.read_batch().await, Err(CodecError::Closed)));

		codec.write("first".into()).await.unwrap();
		codec.write("second".into()).await.unwrap();
		assert_eq!(codec.take_response().as_deref(), Some("first"));
	}
}
