// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;
use rpc_runtime::service::ServiceBuilder;
use rpc_runtime::Server;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::sync::Arc;

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    hostname: String,

    #[arg(long, default_value_t = 0)]
    port: u16,
}

#[derive(Default)]
struct Foo;

#[derive(Debug, Serialize, Deserialize)]
struct SumArgs {
    num1: i64,
    num2: i64,
}

impl Foo {
    fn sum(&self, args: SumArgs) -> Result<i64, String> {
        log::info!("Foo.Sum({}, {})", args.num1, args.num2);
        Ok(args.num1 + args.num2)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();

    let server = Arc::new(Server::new());
    let foo = ServiceBuilder::new("Foo", Foo)?
        .method("Sum", |foo: &Foo, args: SumArgs| foo.sum(args))
        .build();
    server.register(foo)?;

    let address = format!("{}:{}", args.hostname, args.port);
    let listener = TcpListener::bind(&address)?;
    log::info!("rpc server listening on {}", listener.local_addr()?);

    server.accept(&listener);
    Ok(())
}
