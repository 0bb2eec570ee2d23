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

//! Canned HTTP responses.

use hyper::{Body, Response, StatusCode};

const TEXT: &str = "text/plain";
const JSON: &str = "application/json; charset=utf-8";

pub(crate) fn ok_json(body: String) -> Response<Body> {
	from_template(StatusCode::OK, body, JSON)
}

/// The request was handled but produced nothing to say (a notification).
pub(crate) fn ok_empty() -> Response<Body> {
	from_template(StatusCode::OK, "", JSON)
}

pub(crate) fn method_not_allowed() -> Response<Body> {
	from_template(StatusCode::METHOD_NOT_ALLOWED, "Used HTTP Method is not allowed. POST is required\n", TEXT)
}

pub(crate) fn unsupported_content_type() -> Response<Body> {
	from_template(
		StatusCode::UNSUPPORTED_MEDIA_TYPE,
		"Supplied content type is not allowed. Content-Type: application/json is required\n",
		TEXT,
	)
}

pub(crate) fn too_large() -> Response<Body> {
	from_template(StatusCode::PAYLOAD_TOO_LARGE, "Request body exceeds the configured limit\n", TEXT)
}

pub(crate) fn malformed() -> Response<Body> {
	from_template(StatusCode::BAD_REQUEST, "Request body is not valid UTF-8\n", TEXT)
}

fn from_template<S: Into<Body>>(status: StatusCode, body: S, content_type: &'static str) -> Response<Body> {
	Response::builder()
		.status(status)
		.header("content-type", content_type)
		.body(body.into())
		.expect("static response headers are valid; qed")
}
