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

//! One wire protocol, many transports: persistent duplex streams get calls,
//! notifications and server-pushed subscriptions; HTTP gets isolated
//! one-shot exchanges. Pick the surface through this crate's features.

/// WebSocket client.
#[cfg(feature = "ws-client")]
pub use duplexrpc_ws_client as ws_client;

/// HTTP client.
#[cfg(feature = "http-client")]
pub use duplexrpc_http_client as http_client;

/// Stream transports producing codecs.
#[cfg(feature = "client-transport")]
pub use duplexrpc_client_transport as client_transport;

/// HTTP server.
#[cfg(feature = "http-server")]
pub use duplexrpc_http_server as http_server;

/// The transport-agnostic engine.
#[cfg(feature = "duplexrpc-core")]
pub use duplexrpc_core as core;

/// Wire types.
#[cfg(feature = "duplexrpc-types")]
pub use duplexrpc_types as types;

#[cfg(feature = "duplexrpc-core")]
pub use duplexrpc_core::Error;

#[cfg(all(feature = "duplexrpc-core", feature = "server-core"))]
pub use duplexrpc_core::server::{CodecOptions, Module, Notifier, Server, Subscription};

#[cfg(all(feature = "duplexrpc-core", feature = "ws-client"))]
pub use duplexrpc_core::client::{BatchRequest, BatchResponse, Client, ClientBuilder, ClientSubscription};

#[cfg(feature = "ws-client")]
pub use duplexrpc_ws_client::WsClientBuilder;

#[cfg(feature = "http-client")]
pub use duplexrpc_http_client::HttpClientBuilder;

#[cfg(feature = "http-server")]
pub use duplexrpc_http_server::HttpServerBuilder;
