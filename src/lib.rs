// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A minimal RPC runtime: a framed wire protocol, pluggable codecs, a server dispatch engine with
//! per-connection and per-service-method concurrency, and a client call multiplexer.
//!
//! ```ignore
//! use rpc_runtime::{server, service::ServiceBuilder};
//!
//! #[derive(Default)]
//! struct Foo;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Args { num1: i64, num2: i64 }
//!
//! let svc = ServiceBuilder::new("Foo", Foo::default())
//!     .unwrap()
//!     .method("Sum", |_: &Foo, args: Args| Ok::<_, String>(args.num1 + args.num2))
//!     .build();
//! server::register(svc).unwrap();
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod option;
pub mod server;
pub mod service;
pub mod stream;

pub use client::{dial, Call, Client};
pub use codec::{Codec, CodecKind, Header};
pub use error::{CodecError, DispatchError, Error, ProtocolError};
pub use option::RpcOption;
pub use server::Server;
pub use service::{Dispatch, Service, ServiceBuilder};
