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

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Parse error code.
pub const PARSE_ERROR_CODE: i32 = -32700;
/// Invalid request code.
pub const INVALID_REQUEST_CODE: i32 = -32600;
/// Method not found code.
pub const METHOD_NOT_FOUND_CODE: i32 = -32601;
/// Invalid params code.
pub const INVALID_PARAMS_CODE: i32 = -32602;
/// Internal error code.
pub const INTERNAL_ERROR_CODE: i32 = -32603;
/// Generic server error code; covers subscription-not-found,
/// notifications-unsupported and shutdown replies.
pub const SERVER_ERROR_CODE: i32 = -32000;

/// JSON-RPC error code with its canned message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
	/// The JSON sent is not a valid JSON value.
	ParseError,
	/// The JSON sent is not a valid request object.
	InvalidRequest,
	/// The method does not exist / is not available.
	MethodNotFound,
	/// Invalid method parameter(s).
	InvalidParams,
	/// Internal JSON-RPC error.
	InternalError,
	/// Implementation-defined server error.
	ServerError(i32),
}

impl ErrorCode {
	/// Returns the numeric code.
	pub fn code(&self) -> i32 {
		match *self {
			ErrorCode::ParseError => PARSE_ERROR_CODE,
			ErrorCode::InvalidRequest => INVALID_REQUEST_CODE,
			ErrorCode::MethodNotFound => METHOD_NOT_FOUND_CODE,
			ErrorCode::InvalidParams => INVALID_PARAMS_CODE,
			ErrorCode::InternalError => INTERNAL_ERROR_CODE,
			ErrorCode::ServerError(code) => code,
		}
	}

	/// Returns the canned message for the code.
	pub fn message(&self) -> &'static str {
		match self {
			ErrorCode::ParseError => "parse error",
			ErrorCode::InvalidRequest => "invalid request",
			ErrorCode::MethodNotFound => "method not found",
			ErrorCode::InvalidParams => "invalid params",
			ErrorCode::InternalError => "internal error",
			ErrorCode::ServerError(_) => "server error",
		}
	}
}

impl From<i32> for ErrorCode {
	fn from(code: i32) -> Self {
		match code {
			PARSE_ERROR_CODE => ErrorCode::ParseError,
			INVALID_REQUEST_CODE => ErrorCode::InvalidRequest,
			METHOD_NOT_FOUND_CODE => ErrorCode::MethodNotFound,
			INVALID_PARAMS_CODE => ErrorCode::InvalidParams,
			INTERNAL_ERROR_CODE => ErrorCode::InternalError,
			code => ErrorCode::ServerError(code),
		}
	}
}

/// The `error` member of an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
	/// Numeric error code.
	pub code: i32,
	/// Short error description.
	pub message: String,
	/// Optional structured error payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Box<RawValue>>,
}

impl ErrorObject {
	/// Creates an error object with an explicit code and message.
	pub fn new(code: i32, message: impl Into<String>) -> Self {
		Self { code, message: message.into(), data: None }
	}

	/// Attaches a structured payload to the error.
	pub fn with_data(mut self, data: Box<RawValue>) -> Self {
		self.data = Some(data);
		self
	}

	/// Error for a method that is not part of any registered service.
	pub fn method_not_found(method: &str) -> Self {
		Self::new(METHOD_NOT_FOUND_CODE, format!("the method {} does not exist/is not available", method))
	}

	/// Error for a subscription name unknown within a namespace.
	pub fn subscription_not_found(namespace: &str, name: &str) -> Self {
		Self::new(SERVER_ERROR_CODE, format!("no {:?} subscription in {} namespace", name, namespace))
	}

	/// Error for an unsubscribe naming an id that is not active.
	pub fn unknown_subscription(id: &str) -> Self {
		Self::new(SERVER_ERROR_CODE, format!("subscription not found: {}", id))
	}

	/// Error answered to `*_subscribe` on connections without subscription support.
	pub fn notifications_unsupported() -> Self {
		Self::new(SERVER_ERROR_CODE, "notifications not supported")
	}

	/// Error answered to requests arriving while the server shuts down.
	pub fn server_shutting_down() -> Self {
		Self::new(SERVER_ERROR_CODE, "server is shutting down")
	}

	/// Invalid request with a detail message, e.g. `"empty batch"`.
	pub fn invalid_request(detail: impl Into<String>) -> Self {
		Self::new(INVALID_REQUEST_CODE, detail)
	}

	/// Invalid params with the underlying decode failure as message.
	pub fn invalid_params(detail: impl fmt::Display) -> Self {
		Self::new(INVALID_PARAMS_CODE, format!("invalid argument: {}", detail))
	}

	/// Parse error carrying the decode failure message.
	pub fn parse_error(detail: impl fmt::Display) -> Self {
		Self::new(PARSE_ERROR_CODE, detail.to_string())
	}

	/// Internal error.
	pub fn internal(detail: impl fmt::Display) -> Self {
		Self::new(INTERNAL_ERROR_CODE, detail.to_string())
	}
}

impl From<ErrorCode> for ErrorObject {
	fn from(code: ErrorCode) -> Self {
		Self::new(code.code(), code.message())
	}
}

impl PartialEq for ErrorObject {
	fn eq(&self, other: &Self) -> bool {
		let data_eq = match (&self.data, &other.data) {
			(Some(a), Some(b)) => a.get() == b.get(),
			(None, None) => true,
			_ => false,
		};
		self.code == other.code && self.message == other.message && data_eq
	}
}

impl fmt::Display for ErrorObject {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.data {
			Some(data) => write!(f, "{} (code {}): {}", self.message, self.code, data.get()),
			None => write!(f, "{} (code {})", self.message, self.code),
		}
	}
}

impl std::error::Error for ErrorObject {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn method_not_found_text_matches_wire_protocol() {
		let err = ErrorObject::method_not_found("nope");
		assert_eq!(err.code, -32601);
		assert_eq!(err.message, "the method nope does not exist/is not available");
	}

	#[test]
	fn error_object_serialization() {
		let err = ErrorObject::new(-32000, "oops").with_data(serde_json::value::to_raw_value(&1).unwrap());
		let json = serde_json::to_string(&err).unwrap();
		assert_eq!(json, r#"{"code":-32000,"message":"oops","data":1}"#);

		let back: ErrorObject = serde_json::from_str(&json).unwrap();
		assert_eq!(back, err);
	}

	#[test]
	fn data_is_omitted_when_absent() {
		let json = serde_json::to_string(&ErrorObject::invalid_request("empty batch")).unwrap();
		assert_eq!(json, r#"{"code":-32600,"message":"empty batch"}"#);
	}
}
