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

/// Suffix of the notification method carrying subscription payloads,
/// i.e. `<namespace>_subscription`.
pub const SUBSCRIPTION_METHOD_SUFFIX: &str = "_subscription";

/// Maximum number of hex characters in a subscription id, after the prefix.
pub const MAX_SUBSCRIPTION_ID_LEN: usize = 32;

/// Opaque server-allocated subscription id.
///
/// The wire form is a `0x`-prefixed hex string of at most
/// [`MAX_SUBSCRIPTION_ID_LEN`] characters after the prefix. Servers here
/// always emit the full 32 characters (16 random bytes); shorter well-formed
/// ids from other implementations are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
	/// Wraps a raw id without validation; peers' ids are opaque.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Whether the id has the canonical `0x`-hex form.
	pub fn is_valid(&self) -> bool {
		match self.0.strip_prefix("0x") {
			Some(hex) => {
				!hex.is_empty() && hex.len() <= MAX_SUBSCRIPTION_ID_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit())
			}
			None => false,
		}
	}

	/// The id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// The `params` member of a `<namespace>_subscription` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPayload<T = Box<RawValue>> {
	/// Which subscription the payload belongs to.
	pub subscription: SubscriptionId,
	/// The pushed value.
	pub result: T,
}

/// Composes the notification method name for a namespace.
pub fn subscription_method(namespace: &str) -> String {
	format!("{}{}", namespace, SUBSCRIPTION_METHOD_SUFFIX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_form() {
		assert!(SubscriptionId::new("0xcd0c3e8af590364c09d0fa6a1210faf5").is_valid());
		assert!(SubscriptionId::new("0x1").is_valid());
		assert!(!SubscriptionId::new("0x").is_valid());
		assert!(!SubscriptionId::new("cd0c3e8af590364c").is_valid());
		assert!(!SubscriptionId::new("0xzz").is_valid());
		assert!(!SubscriptionId::new("0xcd0c3e8af590364c09d0fa6a1210faf5ff").is_valid());
	}

	#[test]
	fn payload_wire_shape() {
		let payload = SubscriptionPayload { subscription: SubscriptionId::new("0x1"), result: 7u32 };
		assert_eq!(serde_json::to_string(&payload).unwrap(), r#"{"subscription":"0x1","result":7}"#);
	}

	#[test]
	fn notification_method_name() {
		assert_eq!(subscription_method("eth"), "eth_subscription");
	}
}
