// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use rpc_runtime::client;
use rpc_runtime::codec::CodecKind;
use rpc_runtime::option::RpcOption;
use rpc_runtime::service::ServiceBuilder;
use rpc_runtime::server::{self, serve_one_pipe_conn, Server};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct SumArgs {
    num1: i64,
    num2: i64,
}

#[derive(Default)]
struct Foo;

impl Foo {
    fn sum(&self, args: SumArgs) -> Result<i64, String> {
        Ok(args.num1 + args.num2)
    }

    fn sleepy_sum(&self, args: SumArgs) -> Result<i64, String> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(args.num1 + args.num2)
    }
}

fn foo_service() -> rpc_runtime::Service<Foo> {
    ServiceBuilder::new("Foo", Foo::default())
        .unwrap()
        .method("Sum", |foo: &Foo, args: SumArgs| foo.sum(args))
        .method("SleepySum", |foo: &Foo, args: SumArgs| foo.sleepy_sum(args))
        .build()
}

fn new_test_server() -> Arc<Server> {
    let server = Arc::new(Server::new());
    server.register(foo_service()).unwrap();
    server
}

#[test]
fn basic_call_succeeds_and_counts() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None).with_codec_tag(CodecKind::Gob.tag());
    let (endpoint, _server_join) = serve_one_pipe_conn(Arc::clone(&server), opt.clone()).unwrap();

    let (client, _receiver) = client::attach(endpoint, CodecKind::Gob);
    let reply: i64 = client
        .call("Foo.Sum", &SumArgs { num1: 3, num2: 4 })
        .unwrap();
    assert_eq!(reply, 7);

    client.close().unwrap();
}

#[test]
fn concurrent_calls_are_all_served() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None).with_codec_tag(CodecKind::Gob.tag());
    let (endpoint, _server_join) = serve_one_pipe_conn(Arc::clone(&server), opt).unwrap();
    let (client, _receiver) = client::attach(endpoint, CodecKind::Gob);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let client = client.clone();
            std::thread::spawn(move || {
                let reply: i64 = client
                    .call("Foo.Sum", &SumArgs { num1: i, num2: 10 })
                    .unwrap();
                assert_eq!(reply, i + 10);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    client.close().unwrap();
}

#[test]
fn unknown_method_reports_error_and_connection_stays_usable() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None).with_codec_tag(CodecKind::Gob.tag());
    let (endpoint, _server_join) = serve_one_pipe_conn(Arc::clone(&server), opt).unwrap();
    let (client, _receiver) = client::attach(endpoint, CodecKind::Gob);

    let err = client
        .call::<i64>("Foo.sum", &SumArgs { num1: 1, num2: 1 })
        .unwrap_err();
    assert!(
        err.to_string().contains("can't find method"),
        "unexpected error: {err}"
    );

    // the connection is still healthy: a well-formed call afterwards still succeeds.
    let reply: i64 = client
        .call("Foo.Sum", &SumArgs { num1: 5, num2: 5 })
        .unwrap();
    assert_eq!(reply, 10);

    client.close().unwrap();
}

#[test]
fn handle_timeout_cuts_off_a_slow_handler() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None)
        .with_codec_tag(CodecKind::Gob.tag())
        .with_handle_timeout(Duration::from_millis(50));
    let (endpoint, _server_join) = serve_one_pipe_conn(Arc::clone(&server), opt).unwrap();
    let (client, _receiver) = client::attach(endpoint, CodecKind::Gob);

    let start = std::time::Instant::now();
    let err = client
        .call::<i64>("Foo.SleepySum", &SumArgs { num1: 1, num2: 1 })
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(
        err.to_string().to_lowercase().contains("timeout"),
        "unexpected error: {err}"
    );
    assert!(
        elapsed < Duration::from_millis(400),
        "handler timeout did not cut the call short: {elapsed:?}"
    );

    client.close().unwrap();
}

#[test]
fn dial_with_unknown_codec_tag_fails_without_hanging() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None).with_codec_tag("application/xyz");
    let (endpoint, server_join) = serve_one_pipe_conn(Arc::clone(&server), opt).unwrap();

    // there is no codec for this tag, so nothing further is sent; just confirm the server side
    // closes out (it logs a warning and returns) rather than blocking forever.
    drop(endpoint);
    server_join.join().unwrap();
}

#[test]
fn close_drains_pending_calls_exactly_once_and_is_idempotent() {
    let server = new_test_server();
    let opt = RpcOption::overlay(None)
        .with_codec_tag(CodecKind::Gob.tag())
        .with_handle_timeout(Duration::from_secs(5));
    let (endpoint, _server_join) = serve_one_pipe_conn(Arc::clone(&server), opt).unwrap();
    let (client, _receiver) = client::attach(endpoint, CodecKind::Gob);

    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    client
        .go("Foo.SleepySum", &SumArgs { num1: 1, num2: 1 }, tx)
        .unwrap();

    client.close().unwrap();

    let call = rx.recv().unwrap();
    assert!(call.reply_bytes.is_err());

    assert!(client.close().is_err());
}

#[test]
fn default_server_registration_rejects_duplicates() {
    server::register(foo_service()).unwrap();
    let err = server::register(foo_service());
    assert!(err.is_err(), "re-registering Foo under the default server should fail");
}
