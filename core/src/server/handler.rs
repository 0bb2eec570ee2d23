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

//! Inbound dispatch: classifies decoded frames and turns calls into
//! futures the connection loop drives, one per call.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::value::RawValue;

use duplexrpc_types::{split_first_param, ErrorObject, Id, Message, MessageKind, OwnedParams, Params, SubscriptionId};

use crate::server::module::{MethodKind, Methods};
use crate::server::notifier::Notifier;
use crate::server::CodecOptions;

/// What a dispatched frame produced.
#[derive(Debug)]
pub(crate) struct CallOutcome {
	/// The response to put on the wire, if the frame warrants one.
	pub(crate) response: Option<Message>,
	/// Subscription to activate once the response has been enqueued.
	pub(crate) activate: Option<SubscriptionId>,
}

impl CallOutcome {
	fn nothing() -> Self {
		Self { response: None, activate: None }
	}

	fn respond(msg: Message) -> Self {
		Self { response: Some(msg), activate: None }
	}
}

/// A dispatched frame: either settled immediately or a call to drive.
pub(crate) enum Dispatched {
	Ready(CallOutcome),
	Future(BoxFuture<'static, CallOutcome>),
}

impl Dispatched {
	pub(crate) fn into_future(self) -> BoxFuture<'static, CallOutcome> {
		match self {
			Dispatched::Ready(outcome) => futures_util::future::ready(outcome).boxed(),
			Dispatched::Future(fut) => fut,
		}
	}
}

/// Classifies one decoded frame and resolves it to an outcome.
///
/// `notifier` is `None` when the connection does not support subscriptions;
/// `*_subscribe` then answers a notifications-unsupported error.
pub(crate) fn dispatch(methods: &Methods, notifier: Option<&Notifier>, options: CodecOptions, msg: Message) -> Dispatched {
	match msg.kind() {
		MessageKind::Response => {
			// Servers never issue calls on this connection, so no response
			// can be expected here.
			tracing::debug!("[handler] dropping unexpected response for id {:?}", msg.id);
			Dispatched::Ready(CallOutcome::nothing())
		}
		MessageKind::Invalid => {
			Dispatched::Ready(CallOutcome::respond(Message::invalid_request(ErrorObject::invalid_request("invalid request"))))
		}
		MessageKind::Notification => {
			let method = msg.method.expect("notifications have a method; qed");
			dispatch_notification(methods, options, &method, msg.params)
		}
		MessageKind::Request => {
			let id = msg.id.expect("requests have an id; qed");
			if !id.is_valid() {
				return Dispatched::Ready(CallOutcome::respond(Message::invalid_request(ErrorObject::invalid_request(
					"invalid request id",
				))));
			}
			let method = msg.method.expect("requests have a method; qed");
			if method.ends_with("_subscribe") {
				handle_subscribe(methods, notifier, id, &method, msg.params)
			} else if method.ends_with("_unsubscribe") {
				Dispatched::Ready(handle_unsubscribe(notifier, id, msg.params))
			} else {
				dispatch_method_call(methods, options, id, &method, msg.params)
			}
		}
	}
}

fn dispatch_method_call(
	methods: &Methods,
	options: CodecOptions,
	id: Id,
	method: &str,
	params: Option<Box<RawValue>>,
) -> Dispatched {
	if !options.method_invocation {
		return Dispatched::Ready(CallOutcome::respond(Message::error_response(id, ErrorObject::method_not_found(method))));
	}
	match methods.method(method) {
		None => Dispatched::Ready(CallOutcome::respond(Message::error_response(id, ErrorObject::method_not_found(method)))),
		Some(MethodKind::Sync(cb)) => {
			let cb = cb.clone();
			Dispatched::Future(
				async move {
					let borrowed = Params::new(params.as_deref().map(|p| p.get()));
					let response = match cb(borrowed) {
						Ok(result) => Message::response(id, result),
						Err(err) => Message::error_response(id, err),
					};
					CallOutcome::respond(response)
				}
				.boxed(),
			)
		}
		Some(MethodKind::Async(cb)) => {
			let fut = cb(OwnedParams::new(params));
			Dispatched::Future(
				async move {
					let response = match fut.await {
						Ok(result) => Message::response(id, result),
						Err(err) => Message::error_response(id, err),
					};
					CallOutcome::respond(response)
				}
				.boxed(),
			)
		}
	}
}

/// Notifications are one-way calls: the callback runs, anything it returns
/// is discarded, and failures never reach the peer.
fn dispatch_notification(methods: &Methods, options: CodecOptions, method: &str, params: Option<Box<RawValue>>) -> Dispatched {
	if !options.method_invocation {
		return Dispatched::Ready(CallOutcome::nothing());
	}
	match methods.method(method) {
		None => {
			tracing::debug!("[handler] dropping notification for unknown method {:?}", method);
			Dispatched::Ready(CallOutcome::nothing())
		}
		Some(MethodKind::Sync(cb)) => {
			let cb = cb.clone();
			Dispatched::Future(
				async move {
					let borrowed = Params::new(params.as_deref().map(|p| p.get()));
					if let Err(e) = cb(borrowed) {
						tracing::debug!("[handler] notification handler failed: {}", e);
					}
					CallOutcome::nothing()
				}
				.boxed(),
			)
		}
		Some(MethodKind::Async(cb)) => {
			let fut = cb(OwnedParams::new(params));
			Dispatched::Future(
				async move {
					if let Err(e) = fut.await {
						tracing::debug!("[handler] notification handler failed: {}", e);
					}
					CallOutcome::nothing()
				}
				.boxed(),
			)
		}
	}
}

/// `<namespace>_subscribe`: the first positional argument names the
/// subscription within the namespace; the rest belongs to its callback. The
/// response carries the allocated id, and the subscription is activated only
/// after that response is on its way out.
fn handle_subscribe(
	methods: &Methods,
	notifier: Option<&Notifier>,
	id: Id,
	method: &str,
	params: Option<Box<RawValue>>,
) -> Dispatched {
	let notifier = match notifier {
		Some(n) => n,
		None => return Dispatched::Ready(CallOutcome::respond(Message::error_response(id, ErrorObject::notifications_unsupported()))),
	};
	let namespace = match method.strip_suffix("_subscribe") {
		Some(ns) if !ns.is_empty() => ns,
		_ => return Dispatched::Ready(CallOutcome::respond(Message::error_response(id, ErrorObject::method_not_found(method)))),
	};
	let (first, rest) = match split_first_param(params.as_deref()) {
		Ok(split) => split,
		Err(err) => return Dispatched::Ready(CallOutcome::respond(Message::error_response(id, err))),
	};
	let name: String = match serde_json::from_str(first.get()) {
		Ok(name) => name,
		Err(_) => {
			return Dispatched::Ready(CallOutcome::respond(Message::error_response(
				id,
				ErrorObject::invalid_params("subscription name must be a string"),
			)))
		}
	};
	let key = format!("{}_{}", namespace, name);
	let cb = match methods.subscription(&key) {
		Some(cb) => cb.0.clone(),
		None => {
			return Dispatched::Ready(CallOutcome::respond(Message::error_response(
				id,
				ErrorObject::subscription_not_found(namespace, &name),
			)))
		}
	};
	let scoped = notifier.scoped(namespace);
	Dispatched::Future(
		async move {
			match cb(OwnedParams::new(rest), scoped) {
				Ok(sub) => match serde_json::value::to_raw_value(sub.id()) {
					Ok(raw) => CallOutcome { response: Some(Message::response(id, raw)), activate: Some(sub.id().clone()) },
					Err(e) => CallOutcome::respond(Message::error_response(id, ErrorObject::internal(e))),
				},
				Err(err) => CallOutcome::respond(Message::error_response(id, err)),
			}
		}
		.boxed(),
	)
}

/// `<namespace>_unsubscribe(<id>)`: removes the server-side subscription and
/// answers `true`, or an error for an unknown id.
fn handle_unsubscribe(notifier: Option<&Notifier>, id: Id, params: Option<Box<RawValue>>) -> CallOutcome {
	let notifier = match notifier {
		Some(n) => n,
		None => return CallOutcome::respond(Message::error_response(id, ErrorObject::notifications_unsupported())),
	};
	let sub_id: SubscriptionId = match Params::new(params.as_deref().map(|p| p.get())).one() {
		Ok(sub_id) => sub_id,
		Err(err) => return CallOutcome::respond(Message::error_response(id, err)),
	};
	match notifier.unsubscribe(&sub_id) {
		Ok(()) => match serde_json::value::to_raw_value(&true) {
			Ok(raw) => CallOutcome::respond(Message::response(id, raw)),
			Err(e) => CallOutcome::respond(Message::error_response(id, ErrorObject::internal(e))),
		},
		Err(err) => CallOutcome::respond(Message::error_response(id, err)),
	}
}
