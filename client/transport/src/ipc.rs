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

use std::io;
use std::path::Path;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use duplexrpc_core::codec::StreamCodec;

/// Codec over a local unix socket.
pub type IpcCodec = StreamCodec<OwnedReadHalf, OwnedWriteHalf>;

/// Connects to a local socket at `path`.
pub async fn connect(path: impl AsRef<Path>) -> io::Result<IpcCodec> {
	let path = path.as_ref();
	let stream = UnixStream::connect(path).await?;
	let (read, write) = stream.into_split();
	Ok(StreamCodec::new(read, write, path.display().to_string()))
}

/// Wraps an accepted server-side stream.
pub fn from_stream(stream: UnixStream, remote: impl Into<String>) -> IpcCodec {
	let (read, write) = stream.into_split();
	StreamCodec::new(read, write, remote)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	use duplexrpc_core::client::ClientBuilder;
	use duplexrpc_core::server::{CodecOptions, Module, Server};
	use tokio::net::UnixListener;

	#[tokio::test]
	async fn call_over_unix_socket() {
		let path = std::env::temp_dir().join(format!("duplexrpc-ipc-test-{}.sock", std::process::id()));
		let _ = std::fs::remove_file(&path);
		let listener = UnixListener::bind(&path).unwrap();

		let mut module = Module::new("test", ()).unwrap();
		module.register_method("echo", |params, _| params.one::<String>());
		let mut server = Server::new();
		server.merge(module);

		let accept_server = server.clone();
		tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			accept_server.serve_codec(Arc::new(from_stream(stream, "ipc-peer")), CodecOptions::ALL).await;
		});

		let codec = connect(&path).await.unwrap();
		let client = ClientBuilder::new().build_with_codec(Arc::new(codec));
		let reply: String = client.call("test_echo", ("over ipc",)).await.unwrap();
		assert_eq!(reply, "over ipc");

		let _ = std::fs::remove_file(&path);
	}
}
