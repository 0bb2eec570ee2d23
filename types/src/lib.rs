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

//! Shared wire types for the duplexrpc engine.
//!
//! Every transport exchanges the same JSON-RPC 2.0 frames; the [`Message`]
//! type is the single decoded shape all of them produce and consume, and
//! [`Message::kind`] is the one classification used everywhere.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

/// JSON-RPC error objects and the fixed error-code taxonomy.
pub mod error;
/// The decoded wire frame and batch parsing.
pub mod message;
/// Request ids and positional parameter handling.
pub mod params;
/// Subscription ids and notification payloads.
pub mod subscription;

pub use error::{ErrorCode, ErrorObject};
pub use message::{parse_incoming, Message, MessageKind};
pub use params::{prepend_param, split_first_param, Id, OwnedParams, Params, TwoPointZero};
pub use subscription::{SubscriptionId, SubscriptionPayload, SUBSCRIPTION_METHOD_SUFFIX};
