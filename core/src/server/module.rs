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

use std::fmt::{self, Debug};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::value::RawValue;

use duplexrpc_types::{ErrorObject, OwnedParams, Params};

use crate::error::Error;
use crate::server::notifier::{Notifier, Subscription};

/// A synchronous RPC endpoint: positional params in, serialized result out.
pub type SyncMethod = Arc<dyn Send + Sync + Fn(Params) -> Result<Box<RawValue>, ErrorObject>>;
/// Similar to [`SyncMethod`], but produces its result asynchronously; the
/// params are handed over owned because the call outlives the frame.
pub type AsyncMethod = Arc<dyn Send + Sync + Fn(OwnedParams) -> BoxFuture<'static, Result<Box<RawValue>, ErrorObject>>>;
/// A subscription endpoint. The callback creates its subscription through
/// the [`Notifier`] and returns the capability; the dispatcher serializes
/// the id as the call result and activates the subscription once that
/// response is on its way out.
pub type SubscriptionMethod = Arc<dyn Send + Sync + Fn(OwnedParams, Notifier) -> Result<Subscription, ErrorObject>>;

/// Callback wrapper that can be either sync or async.
#[derive(Clone)]
pub enum MethodKind {
	/// Synchronous method handler.
	Sync(SyncMethod),
	/// Asynchronous method handler.
	Async(AsyncMethod),
}

impl Debug for MethodKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Sync(_) => write!(f, "Sync"),
			Self::Async(_) => write!(f, "Async"),
		}
	}
}

/// Registered subscription handler.
#[derive(Clone)]
pub struct SubscriptionCallback(pub(crate) SubscriptionMethod);

impl Debug for SubscriptionCallback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Subscription")
	}
}

/// Reference-counted, clone-on-write tables of callable methods and
/// subscriptions, keyed by `<namespace>_<name>`.
///
/// Subscription callbacks live in their own table: they are reachable only
/// through `<namespace>_subscribe`, never as plain calls.
#[derive(Default, Debug, Clone)]
pub struct Methods {
	callbacks: Arc<FxHashMap<String, MethodKind>>,
	subscriptions: Arc<FxHashMap<String, SubscriptionCallback>>,
}

impl Methods {
	/// Creates an empty [`Methods`].
	pub fn new() -> Self {
		Self::default()
	}

	fn insert_callback(&mut self, key: String, callback: MethodKind) {
		if self.mut_callbacks().insert(key.clone(), callback).is_some() {
			tracing::debug!("[Methods::insert_callback] replacing method {:?}", key);
		}
	}

	fn insert_subscription(&mut self, key: String, callback: SubscriptionCallback) {
		if self.mut_subscriptions().insert(key.clone(), callback).is_some() {
			tracing::debug!("[Methods::insert_subscription] replacing subscription {:?}", key);
		}
	}

	/// Helper for obtaining a mut ref to the callbacks table.
	fn mut_callbacks(&mut self) -> &mut FxHashMap<String, MethodKind> {
		Arc::make_mut(&mut self.callbacks)
	}

	fn mut_subscriptions(&mut self) -> &mut FxHashMap<String, SubscriptionCallback> {
		Arc::make_mut(&mut self.subscriptions)
	}

	/// Folds all callbacks from `other` into `self`. Registering a namespace
	/// again is allowed; colliding names replace the earlier registration.
	pub fn merge(&mut self, other: impl Into<Methods>) {
		let mut other = other.into();
		for (name, callback) in other.mut_callbacks().drain() {
			self.insert_callback(name, callback);
		}
		for (name, callback) in other.mut_subscriptions().drain() {
			self.insert_subscription(name, callback);
		}
	}

	/// Returns the method callback registered under the full key.
	pub fn method(&self, name: &str) -> Option<&MethodKind> {
		self.callbacks.get(name)
	}

	/// Returns the subscription callback registered under the full key.
	pub fn subscription(&self, name: &str) -> Option<&SubscriptionCallback> {
		self.subscriptions.get(name)
	}

	/// Returns an `Iterator` over all registered method names.
	pub fn method_names(&self) -> impl Iterator<Item = &str> + '_ {
		self.callbacks.keys().map(|k| k.as_str())
	}

	/// Returns an `Iterator` over all registered subscription names.
	pub fn subscription_names(&self) -> impl Iterator<Item = &str> + '_ {
		self.subscriptions.keys().map(|k| k.as_str())
	}
}

/// A service under construction: a namespace, a shared context value, and
/// the callbacks registered so far. Merged into a server (or another
/// module's [`Methods`]) once complete.
#[derive(Debug, Clone)]
pub struct Module<Context> {
	namespace: String,
	ctx: Arc<Context>,
	methods: Methods,
}

impl<Context> Module<Context> {
	/// Creates a module for `namespace` with a shared `Context`.
	pub fn new(namespace: impl Into<String>, ctx: Context) -> Result<Self, Error> {
		let namespace = namespace.into();
		if namespace.is_empty() {
			return Err(Error::EmptyNamespace);
		}
		Ok(Self { namespace, ctx: Arc::new(ctx), methods: Methods::default() })
	}

	/// The module's namespace.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	fn key(&self, name: &str) -> String {
		format!("{}_{}", self.namespace, name)
	}
}

impl<Context: Send + Sync + 'static> Module<Context> {
	/// Registers a synchronous method, callable as `<namespace>_<name>`.
	pub fn register_method<R, F>(&mut self, name: &str, callback: F)
	where
		R: Serialize,
		F: Fn(Params, &Context) -> Result<R, ErrorObject> + Send + Sync + 'static,
	{
		let ctx = self.ctx.clone();
		let key = self.key(name);
		self.methods.insert_callback(
			key,
			MethodKind::Sync(Arc::new(move |params| {
				let result = callback(params, &*ctx)?;
				serde_json::value::to_raw_value(&result).map_err(ErrorObject::internal)
			})),
		);
	}

	/// Registers an asynchronous method, callable as `<namespace>_<name>`.
	pub fn register_async_method<R, Fun, Fut>(&mut self, name: &str, callback: Fun)
	where
		R: Serialize + Send + 'static,
		Fut: Future<Output = Result<R, ErrorObject>> + Send + 'static,
		Fun: Fn(OwnedParams, Arc<Context>) -> Fut + Send + Sync + 'static,
	{
		let ctx = self.ctx.clone();
		let key = self.key(name);
		self.methods.insert_callback(
			key,
			MethodKind::Async(Arc::new(move |params| {
				let fut = callback(params, ctx.clone());
				async move {
					let result = fut.await?;
					serde_json::value::to_raw_value(&result).map_err(ErrorObject::internal)
				}
				.boxed()
			})),
		);
	}

	/// Registers a subscription, reachable as
	/// `<namespace>_subscribe("<name>", ..)` and terminated through
	/// `<namespace>_unsubscribe(<id>)`.
	///
	/// The callback receives the remaining positional arguments and the
	/// connection's [`Notifier`]; it must create its subscription there and
	/// return the capability. Values pushed before the subscribe call has
	/// been answered are queued, not lost.
	pub fn register_subscription<F>(&mut self, name: &str, callback: F)
	where
		F: Fn(OwnedParams, Notifier, Arc<Context>) -> Result<Subscription, ErrorObject> + Send + Sync + 'static,
	{
		let ctx = self.ctx.clone();
		let key = self.key(name);
		self.methods
			.insert_subscription(key, SubscriptionCallback(Arc::new(move |params, notifier| callback(params, notifier, ctx.clone()))));
	}
}

impl<Context> Deref for Module<Context> {
	type Target = Methods;

	fn deref(&self) -> &Methods {
		&self.methods
	}
}

impl<Context> DerefMut for Module<Context> {
	fn deref_mut(&mut self) -> &mut Methods {
		&mut self.methods
	}
}

impl<Context> From<Module<Context>> for Methods {
	fn from(module: Module<Context>) -> Methods {
		module.methods
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn namespace_must_not_be_empty() {
		assert!(matches!(Module::new("", ()), Err(Error::EmptyNamespace)));
	}

	#[test]
	fn methods_are_keyed_by_namespace_and_name() {
		let mut module = Module::new("test", ()).unwrap();
		module.register_method("echo", |params, _| params.one::<String>());
		let methods: Methods = module.into();
		assert!(methods.method("test_echo").is_some());
		assert!(methods.method("echo").is_none());
	}

	#[test]
	fn subscriptions_are_not_plain_methods() {
		let mut module = Module::new("test", ()).unwrap();
		module.register_subscription("ticks", |_, notifier, _| Ok(notifier.create_subscription()));
		let methods: Methods = module.into();
		assert!(methods.subscription("test_ticks").is_some());
		assert!(methods.method("test_ticks").is_none());
	}

	#[test]
	fn reregistration_overwrites() {
		let mut module = Module::new("test", ()).unwrap();
		module.register_method("v", |_, _| Ok(1u32));
		module.register_method("v", |_, _| Ok(2u32));
		let methods: Methods = module.into();
		assert_eq!(methods.method_names().count(), 1);
	}

	#[test]
	fn merge_joins_namespaces() {
		let mut a = Module::new("a", ()).unwrap();
		a.register_method("m", |_, _| Ok(()));
		let mut b = Module::new("b", ()).unwrap();
		b.register_method("m", |_, _| Ok(()));

		let mut methods: Methods = a.into();
		methods.merge(b);
		let mut names: Vec<_> = methods.method_names().collect();
		names.sort_unstable();
		assert_eq!(names, vec!["a_m", "b_m"]);
	}

	#[test]
	fn sync_callback_runs_with_context() {
		let mut module = Module::new("calc", 40u32).unwrap();
		module.register_method("add", |params, base| {
			let n: u32 = params.one()?;
			Ok(base + n)
		});
		let methods: Methods = module.into();
		let cb = match methods.method("calc_add").unwrap() {
			MethodKind::Sync(cb) => cb.clone(),
			MethodKind::Async(_) => panic!("registered as sync"),
		};
		let out = cb(Params::new(Some("[2]"))).unwrap();
		assert_eq!(out.get(), "42");
	}
}
