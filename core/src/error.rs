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

use duplexrpc_types::ErrorObject;

use crate::codec::CodecError;

/// Error type of the engine, shared by client and server surfaces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Error object returned by the remote side for a call.
	#[error("{0}")]
	Call(#[from] ErrorObject),
	/// The underlying connection failed.
	#[error("transport error: {0}")]
	Transport(#[source] anyhow::Error),
	/// A frame could not be serialized or decoded.
	#[error("parse error: {0}")]
	ParseError(#[from] serde_json::Error),
	/// A response carried an id this client never sent.
	#[error("invalid request id")]
	InvalidRequestId,
	/// A subscribe reply did not carry a usable subscription id.
	#[error("invalid subscription id")]
	InvalidSubscriptionId,
	/// The client was closed while the operation was pending.
	#[error("client is closed")]
	ClientQuit,
	/// A success response carried no usable `result` payload for the
	/// requested target type.
	#[error("no result in JSON-RPC response")]
	NoResult,
	/// The configured request timeout elapsed.
	#[error("request timed out")]
	RequestTimeout,
	/// The subscription's forward buffer filled up faster than the consumer
	/// drained it; the subscription was dropped.
	#[error("subscription queue overflow")]
	SubscriptionQueueOverflow,
	/// Subscriptions are not available on this transport or connection.
	#[error("notifications not supported")]
	NotificationsUnsupported,
	/// The server-side subscription is gone; no further notifications can be
	/// delivered for it.
	#[error("subscription closed")]
	SubscriptionClosed,
	/// Services must be registered under a non-empty namespace.
	#[error("namespace must not be empty")]
	EmptyNamespace,
	/// The request exceeded the transport's size limit.
	#[error("request entity too large")]
	RequestTooLarge,
	/// Catch-all for transport-specific failures worth a message.
	#[error("{0}")]
	Custom(String),
}

impl Error {
	/// Wraps an arbitrary failure as a transport error.
	pub fn transport(err: impl Into<anyhow::Error>) -> Self {
		Error::Transport(err.into())
	}
}

impl From<CodecError> for Error {
	fn from(err: CodecError) -> Self {
		match err {
			CodecError::Parse(e) => Error::ParseError(e),
			CodecError::Closed => Error::Transport(anyhow::anyhow!("connection closed")),
			CodecError::Io(e) => Error::Transport(e.into()),
		}
	}
}
