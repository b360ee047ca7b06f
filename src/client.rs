// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The client: dials a server, multiplexes concurrent calls over one connection, and demultiplexes
//! responses by sequence number.

use crate::codec::{self, framing, Codec, CodecKind, Header};
use crate::error::Error;
use crate::option::RpcOption;
use crate::stream::{StreamClose, TcpHandle};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// The result of one in-flight or completed call, delivered on `done` exactly once.
pub struct Call {
    pub service_method: String,
    pub seq: u64,
    pub reply_bytes: Result<Vec<u8>, String>,
}

struct PendingCall {
    done: mpsc::SyncSender<Call>,
    service_method: String,
}

/// Everything a `send` must touch atomically: the sequence counter, the pending-call table, and
/// the closed flag. Guarded by one mutex (`Shared::send`) held across `go()`'s entire
/// seq-assign-through-write span, the direct analog of the upstream source's `sending` mutex —
/// except here it also covers what the original splits into a separate `mu` (seq/pending/closing),
/// so that `close()` cannot run in the gap between a racing `go()`'s availability check and its
/// `pending` insert.
struct SendState {
    closed: bool,
    next_seq: u64,
    pending: HashMap<u64, PendingCall>,
}

struct Shared<S> {
    codec: Codec<S>,
    send: Mutex<SendState>,
}

/// A live connection to an RPC server. Cloning shares the same underlying connection and pending
/// call table (mirrors the upstream source's single `Client` value being safe to use from many
/// goroutines at once).
#[derive(Clone)]
pub struct Client<S> {
    shared: Arc<Shared<S>>,
}

/// Dial a TCP address, perform the handshake (honoring `opt.connect_timeout()`), and return a
/// ready client together with the background receiver thread's join handle.
pub fn dial(
    addr: impl ToSocketAddrs + Send + 'static,
    opt: Option<RpcOption>,
) -> Result<(Client<TcpHandle>, thread::JoinHandle<()>), Error> {
    let opt = RpcOption::overlay(opt);
    let connect_timeout = opt.connect_timeout();

    let (tx, rx) = mpsc::sync_channel(1);
    thread::spawn(move || {
        let result = connect_and_handshake(addr, opt);
        let _ = tx.send(result);
    });

    let (stream, opt) = match connect_timeout {
        Some(d) => rx
            .recv_timeout(d)
            .map_err(|_| Error::ConnectTimeout(d))??,
        None => rx.recv().map_err(|_| Error::Shutdown)??,
    };

    new_client(stream, opt)
}

fn connect_and_handshake(
    addr: impl ToSocketAddrs,
    opt: RpcOption,
) -> Result<(TcpStream, RpcOption), Error> {
    let stream = TcpStream::connect(addr)?;
    let mut writer = stream.try_clone()?;
    let opt_bytes = serde_json::to_vec(&opt).expect("RpcOption always serializes");
    framing::write_frame(&mut writer, &opt_bytes)?;
    Ok((stream, opt))
}

fn new_client(
    stream: TcpStream,
    opt: RpcOption,
) -> Result<(Client<TcpHandle>, thread::JoinHandle<()>), Error> {
    let kind = CodecKind::from_tag(&opt.codec_type)
        .ok_or_else(|| crate::error::ProtocolError::UnknownCodec(opt.codec_type.clone()))?;
    Ok(attach(TcpHandle::new(stream), kind))
}

/// Wrap an already-connected transport on which the connection prelude has already been
/// exchanged. Used directly by tests against the in-memory `pipe` transport, where the test
/// drives the handshake itself; `dial` is the entry point for real TCP connections.
pub fn attach<S>(stream: S, kind: CodecKind) -> (Client<S>, thread::JoinHandle<()>)
where
    S: Read + Write + StreamClose + Clone + Send + 'static,
{
    let codec = Codec::new(kind, stream.clone(), stream);
    let shared = Arc::new(Shared {
        codec,
        send: Mutex::new(SendState {
            closed: false,
            next_seq: 1,
            pending: HashMap::new(),
        }),
    });

    let client = Client {
        shared: Arc::clone(&shared),
    };
    let receiver = thread::spawn(move || receive_loop(shared));

    (client, receiver)
}

/// Runs on a dedicated background thread for the lifetime of the connection: reads one
/// (header, body) pair at a time and routes it to the matching pending call.
fn receive_loop<S>(shared: Arc<Shared<S>>)
where
    S: Read + Write + StreamClose,
{
    loop {
        let header = match shared.codec.read_header() {
            Ok(h) => h,
            Err(e) => {
                if !e.is_eof() {
                    warn!("rpc client: reading header: {e}");
                }
                break;
            }
        };

        let body = shared.codec.read_body_bytes();

        let pending = shared
            .send
            .lock()
            .expect("send state poisoned")
            .pending
            .remove(&header.seq);
        let Some(pending) = pending else {
            // Unknown seq: drain the body we already read (it has no further effect) and move on.
            continue;
        };

        let reply_bytes = if !header.err.is_empty() {
            Err(header.err)
        } else {
            body.map_err(|e| e.to_string())
        };

        let _ = pending.done.send(Call {
            service_method: pending.service_method,
            seq: header.seq,
            reply_bytes,
        });
    }

    terminate_all(&shared, "connection is shut down".to_string());
}

fn terminate_all<S>(shared: &Shared<S>, reason: String) {
    let mut state = shared.send.lock().expect("send state poisoned");
    for (seq, call) in state.pending.drain() {
        let _ = call.done.send(Call {
            service_method: call.service_method,
            seq,
            reply_bytes: Err(reason.clone()),
        });
    }
    state.closed = true;
}

impl<S: Read + Write + StreamClose> Client<S> {
    /// Whether the client is still accepting new calls.
    pub fn is_available(&self) -> bool {
        !self.shared.send.lock().expect("send state poisoned").closed
    }

    /// Asynchronous call: encodes and sends the request, returning a handle whose `done` channel
    /// receives exactly one [`Call`] once the reply arrives (or the connection closes). `done`
    /// must have capacity >= 1; `mpsc::sync_channel(1)` satisfies this and is the expected usage,
    /// since Rust's channel types expose no way to assert capacity at runtime the way Go's `cap()`
    /// does.
    pub fn go(
        &self,
        service_method: impl Into<String>,
        arg: &impl Serialize,
        done: mpsc::SyncSender<Call>,
    ) -> Result<u64, Error> {
        let service_method = service_method.into();
        let arg_bytes = codec::encode_body(arg)?;

        // Held across seq-assign, pending-insert, and the write itself, so requests are framed on
        // the wire in strictly increasing seq order and `close()` can't slip in between a racing
        // call's availability check and its pending-table insert.
        let mut state = self.shared.send.lock().expect("send state poisoned");
        if state.closed {
            return Err(Error::Shutdown);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(
            seq,
            PendingCall {
                done,
                service_method: service_method.clone(),
            },
        );

        let header = Header {
            service_method,
            seq,
            err: String::new(),
        };

        if let Err(e) = self.shared.codec.write(&header, &arg_bytes) {
            if let Some(pending) = state.pending.remove(&seq) {
                let _ = pending.done.send(Call {
                    service_method: pending.service_method,
                    seq,
                    reply_bytes: Err(e.to_string()),
                });
            }
            return Err(e.into());
        }

        Ok(seq)
    }

    /// Synchronous call: blocks until the reply arrives and decodes it into `R`.
    pub fn call<R: DeserializeOwned>(
        &self,
        service_method: impl Into<String>,
        arg: &impl Serialize,
    ) -> Result<R, Error> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.go(service_method, arg, tx)?;
        let call = rx.recv().map_err(|_| Error::Shutdown)?;
        let bytes = call.reply_bytes.map_err(Error::Rpc)?;
        codec::decode_body(&bytes).map_err(Error::from)
    }

    /// Synchronous call bounded by a wall-clock deadline, independent of any server-side
    /// `HandleTimeout`.
    pub fn call_with_timeout<R: DeserializeOwned>(
        &self,
        service_method: impl Into<String>,
        arg: &impl Serialize,
        timeout: Duration,
    ) -> Result<R, Error> {
        let (tx, rx) = mpsc::sync_channel(1);
        let seq = self.go(service_method, arg, tx)?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.terminate_call(seq, "client call timed out".to_string());
                return Err(Error::ConnectTimeout(timeout));
            }
            match rx.recv_timeout(remaining) {
                Ok(call) => {
                    let bytes = call.reply_bytes.map_err(Error::Rpc)?;
                    return codec::decode_body(&bytes).map_err(Error::from);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(Error::Shutdown),
            }
        }
    }

    /// Remove a pending call and deliver it a synthetic error result, as if the server had
    /// responded with `reason`. Used to unblock callers waiting past a client-enforced deadline.
    fn terminate_call(&self, seq: u64, reason: String) {
        let pending = self
            .shared
            .send
            .lock()
            .expect("send state poisoned")
            .pending
            .remove(&seq);
        if let Some(pending) = pending {
            let _ = pending.done.send(Call {
                service_method: pending.service_method,
                seq,
                reply_bytes: Err(reason),
            });
        }
    }

    /// Close the connection. Idempotent: a second call returns `Error::Shutdown`, mirroring the
    /// upstream source's `ErrShutdown` on double-close.
    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.shared.send.lock().expect("send state poisoned");
        if state.closed {
            return Err(Error::Shutdown);
        }
        state.closed = true;
        drop(state);
        debug!("rpc client: closing connection");
        self.shared.codec.close().map_err(Error::from)
    }
}
