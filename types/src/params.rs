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

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ErrorObject;

/// JSON-RPC v2 marker type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TwoPointZero;

struct TwoPointZeroVisitor;

impl<'de> Visitor<'de> for TwoPointZeroVisitor {
	type Value = TwoPointZero;

	fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
		formatter.write_str(r#"a string "2.0""#)
	}

	fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
		match s {
			"2.0" => Ok(TwoPointZero),
			_ => Err(de::Error::custom("invalid JSON-RPC version")),
		}
	}
}

impl<'de> Deserialize<'de> for TwoPointZero {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_str(TwoPointZeroVisitor)
	}
}

impl Serialize for TwoPointZero {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str("2.0")
	}
}

/// Request id.
///
/// Wire ids are scalars: a string or a number. A request carrying anything
/// else is answered with an invalid-request error bearing [`Id::Null`], which
/// is also the only place `null` appears as an id on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(untagged)]
pub enum Id {
	/// Null, only valid in error responses to unidentifiable requests.
	Null,
	/// Numeric id.
	Number(u64),
	/// String id.
	Str(String),
}

impl Id {
	/// Whether the id may appear on a request. `null` may not.
	pub fn is_valid(&self) -> bool {
		!matches!(self, Id::Null)
	}

	/// Returns the numeric value, if the id is a number.
	pub fn as_number(&self) -> Option<u64> {
		match self {
			Id::Number(n) => Some(*n),
			_ => None,
		}
	}
}

impl fmt::Display for Id {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Id::Null => f.write_str("null"),
			Id::Number(n) => n.fmt(f),
			Id::Str(s) => write!(f, "{:?}", s),
		}
	}
}

impl From<u64> for Id {
	fn from(n: u64) -> Self {
		Id::Number(n)
	}
}

/// Borrowed view over the `params` member of an incoming call, handed to
/// method callbacks. Parsing is positional: the raw value is a JSON array
/// and the callback decodes it into its argument types, `null` being
/// acceptable wherever the target type is an `Option`.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a>(Option<&'a str>);

impl<'a> Params<'a> {
	/// Creates a view over raw JSON params.
	pub fn new(raw: Option<&'a str>) -> Self {
		Self(raw)
	}

	/// Whether no params were supplied at all.
	pub fn is_empty(&self) -> bool {
		self.0.is_none()
	}

	/// Decodes the whole params array into `T`, typically a tuple of the
	/// callback's argument types.
	pub fn parse<T: Deserialize<'a>>(&self) -> Result<T, ErrorObject> {
		let raw = self.0.unwrap_or("null");
		serde_json::from_str(raw).map_err(|e| {
			tracing::debug!("params parse failed: {}", e);
			ErrorObject::invalid_params(e)
		})
	}

	/// Decodes a single-argument params array.
	pub fn one<T: Deserialize<'a>>(&self) -> Result<T, ErrorObject> {
		self.parse::<[T; 1]>().map(|[res]| res)
	}

	/// The raw JSON text, if any.
	pub fn as_raw(&self) -> Option<&'a str> {
		self.0
	}
}

/// Owned counterpart of [`Params`], handed to callbacks whose execution
/// outlives the borrow of the incoming frame (async methods, subscriptions).
#[derive(Debug, Clone, Default)]
pub struct OwnedParams(Option<Box<RawValue>>);

impl OwnedParams {
	/// Wraps raw owned params.
	pub fn new(raw: Option<Box<RawValue>>) -> Self {
		Self(raw)
	}

	/// Borrows as [`Params`].
	pub fn borrowed(&self) -> Params<'_> {
		Params::new(self.0.as_deref().map(|r| r.get()))
	}

	/// Decodes the whole params array into `T`.
	pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ErrorObject> {
		self.borrowed().parse()
	}

	/// Decodes a single-argument params array.
	pub fn one<T: serde::de::DeserializeOwned>(&self) -> Result<T, ErrorObject> {
		self.borrowed().one()
	}

	/// Whether no params were supplied at all.
	pub fn is_empty(&self) -> bool {
		self.0.is_none()
	}
}

/// Splits the leading positional argument off a params array, returning it
/// together with the remaining arguments re-wrapped as an array.
///
/// Subscribe requests are routed on their first argument (the subscription
/// name); the rest belongs to the subscription callback.
pub fn split_first_param(params: Option<&RawValue>) -> Result<(&RawValue, Option<Box<RawValue>>), ErrorObject> {
	let raw = params.ok_or_else(|| ErrorObject::invalid_params("missing subscription name"))?;
	let elems: Vec<&RawValue> =
		serde_json::from_str(raw.get()).map_err(|_| ErrorObject::invalid_params("params must be an array"))?;
	let (first, rest) = match elems.split_first() {
		Some(split) => split,
		None => return Err(ErrorObject::invalid_params("missing subscription name")),
	};
	let rest = if rest.is_empty() {
		None
	} else {
		let joined = rest.iter().map(|r| r.get()).collect::<Vec<_>>().join(",");
		let rejoined = format!("[{}]", joined);
		Some(RawValue::from_string(rejoined).expect("assembled from valid JSON values; qed"))
	};
	Ok((first, rest))
}

/// Inverse of [`split_first_param`]: builds a params array with `first`
/// prepended to an existing positional array.
pub fn prepend_param<T: Serialize>(first: &T, rest: Option<&RawValue>) -> Result<Box<RawValue>, ErrorObject> {
	let first_raw = serde_json::to_string(first).map_err(ErrorObject::internal)?;
	let joined = match rest {
		Some(raw) => {
			let elems: Vec<&RawValue> =
				serde_json::from_str(raw.get()).map_err(|_| ErrorObject::invalid_params("params must be an array"))?;
			let mut parts = Vec::with_capacity(elems.len() + 1);
			parts.push(first_raw);
			parts.extend(elems.iter().map(|e| e.get().to_owned()));
			format!("[{}]", parts.join(","))
		}
		None => format!("[{}]", first_raw),
	};
	RawValue::from_string(joined).map_err(ErrorObject::internal)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_accepts_scalars_only() {
		assert_eq!(serde_json::from_str::<Id>("7").unwrap(), Id::Number(7));
		assert_eq!(serde_json::from_str::<Id>(r#""abc""#).unwrap(), Id::Str("abc".into()));
		assert_eq!(serde_json::from_str::<Id>("null").unwrap(), Id::Null);
		assert!(serde_json::from_str::<Id>("{}").is_err());
		assert!(serde_json::from_str::<Id>("[1]").is_err());
	}

	#[test]
	fn id_round_trips() {
		for (id, wire) in [(Id::Number(1), "1"), (Id::Str("x".into()), r#""x""#), (Id::Null, "null")] {
			assert_eq!(serde_json::to_string(&id).unwrap(), wire);
			assert_eq!(serde_json::from_str::<Id>(wire).unwrap(), id);
		}
	}

	#[test]
	fn params_positional_parse() {
		let params = Params::new(Some(r#"["hi",7]"#));
		let (s, n): (String, i32) = params.parse().unwrap();
		assert_eq!((s.as_str(), n), ("hi", 7));
	}

	#[test]
	fn params_null_for_optional_argument() {
		let params = Params::new(Some(r#"[null]"#));
		assert_eq!(params.one::<Option<u32>>().unwrap(), None);
	}

	#[test]
	fn params_arity_mismatch_is_invalid_params() {
		let params = Params::new(Some(r#"["only"]"#));
		let err = params.parse::<(String, i32)>().unwrap_err();
		assert_eq!(err.code, crate::error::INVALID_PARAMS_CODE);
	}

	#[test]
	fn split_first_keeps_remaining_args() {
		let raw = RawValue::from_string(r#"["counter",0,true]"#.into()).unwrap();
		let (first, rest) = split_first_param(Some(&raw)).unwrap();
		assert_eq!(first.get(), r#""counter""#);
		assert_eq!(rest.unwrap().get(), "[0,true]");
	}

	#[test]
	fn split_first_on_single_arg() {
		let raw = RawValue::from_string(r#"["counter"]"#.into()).unwrap();
		let (first, rest) = split_first_param(Some(&raw)).unwrap();
		assert_eq!(first.get(), r#""counter""#);
		assert!(rest.is_none());
	}

	#[test]
	fn split_first_rejects_empty() {
		let raw = RawValue::from_string("[]".into()).unwrap();
		assert!(split_first_param(Some(&raw)).is_err());
		assert!(split_first_param(None).is_err());
	}
}
