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

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ErrorObject;
use crate::params::{Id, TwoPointZero};
use crate::subscription::SUBSCRIPTION_METHOD_SUFFIX;

/// A decoded JSON-RPC frame.
///
/// All four wire shapes share this one struct; which of them a frame is
/// follows from which members are present, see [`Message::kind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	/// Protocol version marker.
	pub jsonrpc: TwoPointZero,
	/// Request id; absent on notifications. A present-but-`null` id is kept
	/// as [`Id::Null`]: such a frame is a request with an invalid id, not a
	/// notification.
	#[serde(default, deserialize_with = "deserialize_optional_id", skip_serializing_if = "Option::is_none")]
	pub id: Option<Id>,
	/// Method name; absent on responses.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	/// Positional call arguments.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub params: Option<Box<RawValue>>,
	/// Success payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Box<RawValue>>,
	/// Failure payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorObject>,
}

// Keeps `"id":null` distinguishable from a missing id: the field being
// present at all makes the frame id-bearing.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<Id>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Id::deserialize(deserializer).map(Some)
}

/// Classification of a [`Message`].
///
/// The predicates are fixed for every implementer: a frame is a request iff
/// id and method are present, a notification iff only method is present, and
/// a response iff id is present without method and exactly one of
/// result/error is set. Everything else is invalid and answered with an
/// invalid-request error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	/// Expects a response bearing the same id.
	Request,
	/// One-way call.
	Notification,
	/// Reply to an earlier request.
	Response,
	/// None of the above.
	Invalid,
}

impl Message {
	/// Builds a request frame.
	pub fn request(id: Id, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
		Self { jsonrpc: TwoPointZero, id: Some(id), method: Some(method.into()), params, result: None, error: None }
	}

	/// Builds a notification frame.
	pub fn notification(method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
		Self { jsonrpc: TwoPointZero, id: None, method: Some(method.into()), params, result: None, error: None }
	}

	/// Builds a success response frame.
	pub fn response(id: Id, result: Box<RawValue>) -> Self {
		Self { jsonrpc: TwoPointZero, id: Some(id), method: None, params: None, result: Some(result), error: None }
	}

	/// Builds an error response frame.
	pub fn error_response(id: Id, error: ErrorObject) -> Self {
		Self { jsonrpc: TwoPointZero, id: Some(id), method: None, params: None, result: None, error: Some(error) }
	}

	/// Error response with a `null` id, answered to frames whose id cannot
	/// be echoed.
	pub fn invalid_request(error: ErrorObject) -> Self {
		Self::error_response(Id::Null, error)
	}

	/// Classifies the frame; see [`MessageKind`].
	pub fn kind(&self) -> MessageKind {
		match (&self.id, &self.method) {
			(Some(_), Some(_)) => MessageKind::Request,
			(None, Some(_)) => MessageKind::Notification,
			(Some(_), None) => {
				if self.result.is_some() != self.error.is_some() {
					MessageKind::Response
				} else {
					MessageKind::Invalid
				}
			}
			(None, None) => MessageKind::Invalid,
		}
	}

	/// Whether the frame is a subscription notification
	/// (`<namespace>_subscription`).
	pub fn is_subscription_notification(&self) -> bool {
		matches!(&self.method, Some(m) if m.ends_with(SUBSCRIPTION_METHOD_SUFFIX))
	}

	/// The namespace part of the method name, i.e. everything before the
	/// first underscore.
	pub fn namespace(&self) -> Option<&str> {
		self.method.as_deref().and_then(|m| m.split_once('_').map(|(ns, _)| ns))
	}
}

/// Parses one wire value into messages.
///
/// A JSON object yields a single message, a JSON array yields its elements
/// as a batch; the returned flag records which form arrived so the reply can
/// be written in kind. An empty array parses successfully here and is
/// rejected by the dispatcher with an invalid-request error.
pub fn parse_incoming(raw: &str) -> Result<(Vec<Message>, bool), serde_json::Error> {
	if raw.trim_start().starts_with('[') {
		let msgs: Vec<Message> = serde_json::from_str(raw)?;
		Ok((msgs, true))
	} else {
		let msg: Message = serde_json::from_str(raw)?;
		Ok((vec![msg], false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kind_of(raw: &str) -> MessageKind {
		serde_json::from_str::<Message>(raw).unwrap().kind()
	}

	#[test]
	fn classification() {
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","id":1,"method":"test_echo","params":["hi",7]}"#), MessageKind::Request);
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","method":"test_ping"}"#), MessageKind::Notification);
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","id":1,"result":"hi:7"}"#), MessageKind::Response);
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#), MessageKind::Response);
		// Both result and error present.
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#), MessageKind::Invalid);
		// Neither.
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0","id":1}"#), MessageKind::Invalid);
		assert_eq!(kind_of(r#"{"jsonrpc":"2.0"}"#), MessageKind::Invalid);
	}

	#[test]
	fn null_id_is_a_request_not_a_notification() {
		let msg: Message = serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"m"}"#).unwrap();
		assert_eq!(msg.kind(), MessageKind::Request);
		assert_eq!(msg.id, Some(Id::Null));
		assert!(!msg.id.as_ref().unwrap().is_valid());
	}

	#[test]
	fn null_result_is_still_a_response() {
		let msg: Message = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
		assert_eq!(msg.kind(), MessageKind::Response);
		assert_eq!(msg.result.as_ref().unwrap().get(), "null");
	}

	#[test]
	fn request_serialization_is_stable() {
		let params = serde_json::value::to_raw_value(&("hi", 7)).unwrap();
		let msg = Message::request(Id::Number(1), "test_echo", Some(params));
		assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"jsonrpc":"2.0","id":1,"method":"test_echo","params":["hi",7]}"#);
	}

	#[test]
	fn single_and_batch_forms() {
		let (msgs, batch) = parse_incoming(r#"{"jsonrpc":"2.0","id":1,"method":"a_b"}"#).unwrap();
		assert!(!batch);
		assert_eq!(msgs.len(), 1);

		let (msgs, batch) = parse_incoming(r#"[{"jsonrpc":"2.0","id":1,"method":"a_b"},{"jsonrpc":"2.0","method":"a_c"}]"#).unwrap();
		assert!(batch);
		assert_eq!(msgs.len(), 2);

		let (msgs, batch) = parse_incoming("[]").unwrap();
		assert!(batch);
		assert!(msgs.is_empty());
	}

	#[test]
	fn malformed_json_is_an_error() {
		assert!(parse_incoming("{").is_err());
		assert!(parse_incoming(r#"[{"jsonrpc":"2.0","id":1,"method":"a"},1]"#).is_err());
	}

	#[test]
	fn subscription_notification_detection() {
		let msg: Message =
			serde_json::from_str(r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0x1","result":0}}"#)
				.unwrap();
		assert!(msg.is_subscription_notification());
		assert_eq!(msg.namespace(), Some("eth"));
		assert_eq!(msg.kind(), MessageKind::Notification);
	}

	#[test]
	fn invalid_version_is_rejected() {
		assert!(serde_json::from_str::<Message>(r#"{"jsonrpc":"1.0","id":1,"method":"m"}"#).is_err());
	}
}
