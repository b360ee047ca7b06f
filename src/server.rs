// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The server: accepts connections, performs the handshake, and dispatches each request to its
//! registered service/method, optionally bounding handler execution with `HandleTimeout`.

use crate::codec::{framing, Codec, CodecKind, Header};
use crate::error::{DispatchError, ProtocolError};
use crate::option::RpcOption;
use crate::service::Dispatch;
use crate::stream::{pipe, StreamClose, TcpHandle};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

/// A registry of services, with an accept loop that serves them over one or more listeners.
#[derive(Default)]
pub struct Server {
    services: Mutex<HashMap<String, Arc<dyn Dispatch>>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Errors if a service of the same name is already registered, mirroring
    /// the upstream source's `DuplicateService` rejection.
    pub fn register(&self, service: impl Dispatch + 'static) -> Result<(), DispatchError> {
        let mut services = self.services.lock().expect("service registry poisoned");
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(DispatchError::DuplicateService(name));
        }
        services.insert(name, Arc::new(service));
        Ok(())
    }

    fn find_service(&self, service_method: &str) -> Result<(Arc<dyn Dispatch>, String), DispatchError> {
        let (service_name, method) = service_method
            .rsplit_once('.')
            .ok_or_else(|| DispatchError::IllFormed(service_method.to_string()))?;
        if service_name.is_empty() || method.is_empty() {
            return Err(DispatchError::IllFormed(service_method.to_string()));
        }

        let services = self.services.lock().expect("service registry poisoned");
        let service = services
            .get(service_name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownService(service_name.to_string()))?;
        Ok((service, method.to_string()))
    }

    /// Accept connections on `listener` until it errors (typically because it was dropped).
    /// Each connection is served on its own thread; this call blocks the calling thread.
    pub fn accept(self: &Arc<Self>, listener: &TcpListener) {
        for incoming in listener.incoming() {
            let stream = match incoming {
                Ok(s) => s,
                Err(e) => {
                    error!("rpc server: accept error: {e}");
                    continue;
                }
            };
            let server = Arc::clone(self);
            thread::spawn(move || {
                let handle = TcpHandle::new(stream);
                server.serve_conn(handle.clone(), handle);
            });
        }
    }

    /// Serve a single already-accepted connection, given independent read and write handles onto
    /// it (two `Clone`s of the same underlying transport). Used directly by tests against the
    /// `pipe` transport, and internally by `accept`.
    pub fn serve_conn<S>(&self, mut reader: S, writer: S)
    where
        S: Read + Write + StreamClose + Send + 'static,
    {
        let option = match read_option(&mut reader) {
            Ok(opt) => opt,
            Err(e) => {
                warn!("rpc server: options error: {e}");
                let _ = writer.close();
                return;
            }
        };

        let kind = match CodecKind::from_tag(&option.codec_type) {
            Some(k) => k,
            None => {
                warn!("rpc server: invalid codec type {}", option.codec_type);
                let _ = writer.close();
                return;
            }
        };

        let handle_timeout = option.handle_timeout();
        let codec = Arc::new(Codec::new(kind, reader, writer));
        self.serve_codec(codec, handle_timeout);
    }

    fn serve_codec<S>(&self, codec: Arc<Codec<S>>, handle_timeout: Option<Duration>)
    where
        S: Read + Write + StreamClose + Send + 'static,
    {
        let mut workers = Vec::new();

        loop {
            let header = match codec.read_header() {
                Ok(h) => h,
                Err(e) if e.is_eof() => break,
                Err(e) => {
                    error!("rpc server: read header: {e}");
                    break;
                }
            };

            let seq = header.seq;
            let service_method = header.service_method.clone();
            let lookup = self.find_service(&header.service_method);

            let arg_bytes = match codec.read_body_bytes() {
                Ok(b) => b,
                Err(e) => {
                    error!("rpc server: read body: {e}");
                    break;
                }
            };

            let codec_for_worker = Arc::clone(&codec);
            let responded = Arc::new(AtomicBool::new(false));

            let worker = {
                let responded = Arc::clone(&responded);
                let service_method = service_method.clone();
                thread::spawn(move || {
                    let (tx, rx) = mpsc::channel();

                    thread::spawn(move || {
                        let outcome = match lookup {
                            Ok((service, method)) => service.call(&method, &arg_bytes),
                            Err(e) => Err(e),
                        };
                        let _ = tx.send(outcome);
                    });

                    let outcome = match handle_timeout {
                        Some(d) => rx
                            .recv_timeout(d)
                            .map_err(|_| DispatchError::HandleTimeout(d)),
                        None => rx
                            .recv()
                            .map_err(|_| DispatchError::Handler("handler thread panicked".to_string())),
                    };
                    let result = outcome.and_then(|inner| inner);

                    if responded
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        send_response(&codec_for_worker, service_method, seq, result);
                    }
                })
            };
            workers.push(worker);

            if let Some(d) = handle_timeout {
                let codec_for_timeout = Arc::clone(&codec);
                let service_method = service_method.clone();
                thread::spawn(move || {
                    thread::sleep(d);
                    if responded
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        send_response(&codec_for_timeout, service_method, seq, Err(DispatchError::HandleTimeout(d)));
                    }
                });
            }
        }

        for w in workers {
            let _ = w.join();
        }
        debug!("rpc server: connection closed");
    }
}

fn send_response<S>(codec: &Codec<S>, service_method: String, seq: u64, result: Result<Vec<u8>, DispatchError>)
where
    S: Read + Write + StreamClose,
{
    match result {
        Ok(reply_bytes) => {
            let header = Header {
                service_method,
                seq,
                err: String::new(),
            };
            let _ = codec.write(&header, &reply_bytes);
        }
        Err(e) => {
            let header = Header {
                service_method,
                seq,
                err: e.to_string(),
            };
            let _ = codec.write(&header, &[]);
        }
    }
}

fn read_option<R: Read>(reader: &mut R) -> Result<RpcOption, crate::error::Error> {
    let bytes = framing::read_frame(reader)?;
    let opt: RpcOption =
        serde_json::from_slice(&bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    if opt.option_identify != crate::option::OPTION_IDENTIFY {
        return Err(ProtocolError::WrongIdentify(opt.option_identify).into());
    }
    Ok(opt)
}

/// Lazily-constructed process-wide default server, mirroring the upstream source's package-level
/// `DefaultServer` convenience.
static DEFAULT_SERVER: OnceLock<Arc<Server>> = OnceLock::new();

pub fn default_server() -> &'static Arc<Server> {
    DEFAULT_SERVER.get_or_init(|| Arc::new(Server::new()))
}

pub fn register(service: impl Dispatch + 'static) -> Result<(), DispatchError> {
    default_server().register(service)
}

pub fn accept(listener: &TcpListener) {
    default_server().accept(listener)
}

/// A socketpair-backed test harness: writes the connection prelude on the client end, then spawns
/// a thread serving that connection, and returns the client-side [`pipe::Endpoint`] plus a join
/// handle.
pub fn serve_one_pipe_conn(
    server: Arc<Server>,
    opt: RpcOption,
) -> std::io::Result<(pipe::Endpoint, thread::JoinHandle<()>)> {
    let (client_end, server_end) = pipe::pipe()?;

    let mut client_for_write = client_end.clone();
    let opt_bytes = serde_json::to_vec(&opt).expect("RpcOption always serializes");
    framing::write_frame(&mut client_for_write, &opt_bytes)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "failed to write option"))?;

    let join = thread::spawn(move || {
        server.serve_conn(server_end.clone(), server_end);
    });

    Ok((client_end, join))
}
