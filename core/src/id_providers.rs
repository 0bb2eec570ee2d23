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

use std::fmt::Write;

use rand::Rng;

use duplexrpc_types::SubscriptionId;

use crate::traits::IdProvider;

/// Default subscription id allocator: 16 random bytes, hex encoded with a
/// `0x` prefix. `ThreadRng` is cryptographically secure, so ids are not
/// guessable across connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomHexIdProvider;

impl IdProvider for RandomHexIdProvider {
	fn next_id(&self) -> SubscriptionId {
		let bytes: [u8; 16] = rand::thread_rng().gen();
		let mut id = String::with_capacity(2 + bytes.len() * 2);
		id.push_str("0x");
		for byte in bytes {
			write!(id, "{:02x}", byte).expect("writing to a String never fails; qed");
		}
		SubscriptionId::new(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_ids_are_well_formed() {
		let provider = RandomHexIdProvider;
		for _ in 0..64 {
			let id = provider.next_id();
			assert!(id.is_valid(), "bad id: {}", id);
			assert_eq!(id.as_str().len(), 34);
		}
	}

	#[test]
	fn generated_ids_do_not_repeat() {
		let provider = RandomHexIdProvider;
		let a = provider.next_id();
		let b = provider.next_id();
		assert_ne!(a, b);
	}
}
