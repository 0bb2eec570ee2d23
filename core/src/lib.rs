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

//! Transport-agnostic JSON-RPC 2.0 engine.
//!
//! The engine multiplexes requests, responses and notifications over any
//! [`codec::Codec`] and layers a server-pushed subscription protocol on top.
//! Persistent duplex transports (in-process pairs, local sockets, websockets)
//! get the full surface; HTTP is deliberately degraded to synchronous
//! one-shot exchanges without notifications.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

/// Codec abstraction and the built-in in-process and byte-stream codecs.
pub mod codec;
/// Engine error type.
pub mod error;
/// Subscription id generation.
pub mod id_providers;
/// Shared traits.
pub mod traits;

/// Client: calls, batches, notifications, subscriptions, reconnecting dial.
#[cfg(feature = "client")]
pub mod client;
/// Server: service registry, per-connection dispatcher, notifier.
#[cfg(feature = "server")]
pub mod server;

pub use error::Error;
pub use traits::{IdProvider, ToRpcParams};

/// Re-exported wire types; every transport speaks these.
pub use duplexrpc_types as types;
