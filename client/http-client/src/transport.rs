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

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::http::{HeaderValue, StatusCode};
use hyper::Uri;

use duplexrpc_core::client::HttpTransport;
use duplexrpc_core::Error;

const CONTENT_TYPE_JSON: &str = "application/json";

/// One-shot JSON POSTs over hyper.
#[derive(Debug, Clone)]
pub struct HttpTransportClient {
	client: hyper::Client<HttpConnector>,
	target: Uri,
	max_request_body_size: u32,
}

impl HttpTransportClient {
	/// Validates the target url; only plain `http` is dialed here, TLS
	/// termination stays with the embedding application.
	pub(crate) fn new(target: &str, max_request_body_size: u32) -> Result<Self, Error> {
		let target: Uri = target.parse().map_err(|e| Error::Custom(format!("invalid target url: {}", e)))?;
		match target.scheme_str() {
			Some("http") => {}
			Some("https") => {
				return Err(Error::Custom("https is not terminated here, connect via a TLS-terminating proxy".into()))
			}
			_ => return Err(Error::Custom(format!("invalid scheme in target url: {}", target))),
		}
		if target.host().is_none() {
			return Err(Error::Custom("missing host in target url".into()));
		}
		Ok(Self { client: hyper::Client::new(), target, max_request_body_size })
	}
}

#[async_trait]
impl HttpTransport for HttpTransportClient {
	async fn post(&self, body: String) -> Result<String, Error> {
		if body.len() > self.max_request_body_size as usize {
			return Err(Error::RequestTooLarge);
		}
		tracing::trace!("[HttpTransportClient::post] {} bytes to {}", body.len(), self.target);
		let request = hyper::Request::post(self.target.clone())
			.header(hyper::header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
			.header(hyper::header::ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON))
			.body(hyper::Body::from(body))
			.map_err(Error::transport)?;
		let response = self.client.request(request).await.map_err(Error::transport)?;
		match response.status() {
			status if status.is_success() => {
				let bytes = hyper::body::to_bytes(response.into_body()).await.map_err(Error::transport)?;
				String::from_utf8(bytes.to_vec()).map_err(Error::transport)
			}
			StatusCode::PAYLOAD_TOO_LARGE => Err(Error::RequestTooLarge),
			status => Err(Error::Custom(format!("unexpected status {} from {}", status, self.target))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_http_targets() {
		assert!(HttpTransportClient::new("http://127.0.0.1:9933", 1024).is_ok());
	}

	#[test]
	fn refuses_other_schemes() {
		assert!(HttpTransportClient::new("https://127.0.0.1:9933", 1024).is_err());
		assert!(HttpTransportClient::new("ws://127.0.0.1:9933", 1024).is_err());
		assert!(HttpTransportClient::new("no scheme at all", 1024).is_err());
	}

	#[tokio::test]
	async fn refuses_oversized_bodies() {
		let transport = HttpTransportClient::new("http://127.0.0.1:9933", 4).unwrap();
		assert!(matches!(transport.post("12345".into()).await, Err(Error::RequestTooLarge)));
	}
}
