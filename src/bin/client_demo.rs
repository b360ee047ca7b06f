// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;
use rpc_runtime::dial;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    hostname: String,

    #[arg(long, default_value_t = 9000)]
    port: u16,

    #[arg(long, default_value_t = 1)]
    num1: i64,

    #[arg(long, default_value_t = 2)]
    num2: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SumArgs {
    num1: i64,
    num2: i64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();

    let address = format!("{}:{}", args.hostname, args.port);
    let (client, _receiver) = dial(address, None)?;

    let reply: i64 = client.call(
        "Foo.Sum",
        &SumArgs {
            num1: args.num1,
            num2: args.num2,
        },
    )?;
    println!("Foo.Sum({}, {}) = {}", args.num1, args.num2, reply);

    client.close()?;
    Ok(())
}
