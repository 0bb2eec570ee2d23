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

use std::fmt::Debug;

use serde::Serialize;
use serde_json::value::RawValue;

use duplexrpc_types::SubscriptionId;

/// Conversion of caller-supplied positional arguments into the raw `params`
/// array of an outgoing frame. `()` means no params member at all.
pub trait ToRpcParams {
	/// Serializes the arguments as a JSON array, or `None` when there are
	/// none.
	fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error>;
}

impl ToRpcParams for () {
	fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
		Ok(None)
	}
}

impl ToRpcParams for Option<Box<RawValue>> {
	fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
		Ok(self)
	}
}

impl<T: Serialize> ToRpcParams for Vec<T> {
	fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
		serde_json::value::to_raw_value(&self).map(Some)
	}
}

macro_rules! impl_to_rpc_params {
	($($ty:ident),+) => {
		impl<$($ty: Serialize),+> ToRpcParams for ($($ty,)+) {
			fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
				serde_json::value::to_raw_value(&self).map(Some)
			}
		}
	};
}

impl_to_rpc_params!(A);
impl_to_rpc_params!(A, B);
impl_to_rpc_params!(A, B, C);
impl_to_rpc_params!(A, B, C, D);
impl_to_rpc_params!(A, B, C, D, E);
impl_to_rpc_params!(A, B, C, D, E, F);
impl_to_rpc_params!(A, B, C, D, E, F, G);
impl_to_rpc_params!(A, B, C, D, E, F, G, H);

/// Allocator of server-side subscription ids.
///
/// Ids are opaque to clients; the only requirement is uniqueness within the
/// connection for the lifetime of the subscription.
pub trait IdProvider: Send + Sync + Debug {
	/// Returns the next id.
	fn next_id(&self) -> SubscriptionId;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unit_is_no_params() {
		assert!(().to_rpc_params().unwrap().is_none());
	}

	#[test]
	fn tuples_become_arrays() {
		let raw = ("hi", 7).to_rpc_params().unwrap().unwrap();
		assert_eq!(raw.get(), r#"["hi",7]"#);

		let raw = (1,).to_rpc_params().unwrap().unwrap();
		assert_eq!(raw.get(), "[1]");
	}

	#[test]
	fn vec_becomes_array() {
		let raw = vec![1, 2, 3].to_rpc_params().unwrap().unwrap();
		assert_eq!(raw.get(), "[1,2,3]");
	}
}
