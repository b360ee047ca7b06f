// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Service registration without reflection.
//!
//! The upstream source walks a registered value's methods with `reflect`, filtering by
//! signature shape (`func(T, *Args, *Reply) error`) at registration time and constructing
//! zero-valued `Args`/`Reply` with `reflect.New` at call time. Rust has no runtime reflection, so
//! a `Service` is built explicitly: each method is registered by name together with a closure that
//! already knows its argument and reply types. Argument/reply decoding is handled generically
//! inside that closure, so the registry itself only ever holds an opaque `Box<dyn Dispatch>`.

use crate::error::DispatchError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Type-erased entry point into a registered service, held by the server's registry.
pub trait Dispatch: Send + Sync {
    fn name(&self) -> &str;

    /// Look up `method`, decode `arg_bytes` into its argument type, invoke the handler, and
    /// encode the reply. Returns the encoded reply bytes on success.
    fn call(&self, method: &str, arg_bytes: &[u8]) -> Result<Vec<u8>, DispatchError>;

    /// Total number of calls served, summed across all of this service's methods (diagnostic
    /// only, mirrors the upstream source's `numCalls` counter per `methodType`).
    fn num_calls(&self) -> u64;
}

type HandlerFn<T> = dyn Fn(&T, &[u8]) -> Result<Vec<u8>, DispatchError> + Send + Sync;

/// One registered method: argument/reply type names (diagnostic only) and a boxed dispatch
/// closure that owns the decode -> invoke -> encode pipeline for this specific `(Args, Reply)`
/// pair.
pub struct MethodEntry<T> {
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    handler: Box<HandlerFn<T>>,
}

impl<T> MethodEntry<T> {
    fn new<A, R, F>(handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&T, A) -> Result<R, String> + Send + Sync + 'static,
    {
        let handler: Box<HandlerFn<T>> = Box::new(move |receiver, arg_bytes| {
            let arg: A = bincode::deserialize(arg_bytes)
                .map_err(|e| DispatchError::GarbageArgs(e.to_string()))?;
            let reply = handler(receiver, arg).map_err(DispatchError::Handler)?;
            bincode::serialize(&reply)
                .map_err(|e| DispatchError::GarbageArgs(format!("encoding reply: {e}")))
        });

        Self {
            arg_type: type_name::<A>(),
            reply_type: type_name::<R>(),
            num_calls: AtomicU64::new(0),
            handler,
        }
    }

    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }
}

/// A named group of methods bound to one receiver value `T` (analogous to the upstream source's
/// registered struct instance).
pub struct Service<T> {
    name: String,
    receiver: Arc<T>,
    methods: Vec<(String, MethodEntry<T>)>,
}

impl<T: Send + Sync + 'static> Dispatch for Service<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, method: &str, arg_bytes: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let entry = self
            .methods
            .iter()
            .find(|(name, _)| name == method)
            .map(|(_, entry)| entry)
            .ok_or_else(|| DispatchError::UnknownMethod {
                service: self.name.clone(),
                method: method.to_string(),
            })?;

        entry.num_calls.fetch_add(1, Ordering::Relaxed);
        (entry.handler)(&self.receiver, arg_bytes)
    }

    fn num_calls(&self) -> u64 {
        self.methods
            .iter()
            .map(|(_, entry)| entry.num_calls.load(Ordering::Relaxed))
            .sum()
    }
}

/// Builds a [`Service`] by registering one closure per method.
///
/// ```ignore
/// let service = ServiceBuilder::new("Foo", Foo::default())
///     .method("Sum", |foo: &Foo, args: Args| foo.sum(args))
///     .build()?;
/// ```
pub struct ServiceBuilder<T> {
    name: String,
    receiver: Arc<T>,
    methods: Vec<(String, MethodEntry<T>)>,
}

impl<T: Send + Sync + 'static> ServiceBuilder<T> {
    /// `name` must start with an uppercase ASCII letter, mirroring the upstream source's
    /// exported-identifier requirement (`token.IsExported`).
    pub fn new(name: impl Into<String>, receiver: T) -> Result<Self, DispatchError> {
        let name = name.into();
        match name.chars().next() {
            Some(c) if c.is_ascii_uppercase() => {}
            _ => return Err(DispatchError::NotExported(name)),
        }

        Ok(Self {
            name,
            receiver: Arc::new(receiver),
            methods: Vec::new(),
        })
    }

    /// Register one method. `handler` receives the shared receiver and a decoded argument value,
    /// and returns either a reply value or a handler-level error string.
    pub fn method<A, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&T, A) -> Result<R, String> + Send + Sync + 'static,
    {
        self.methods.push((name.into(), MethodEntry::new(handler)));
        self
    }

    pub fn build(self) -> Service<T> {
        Service {
            name: self.name,
            receiver: self.receiver,
            methods: self.methods,
        }
    }
}
