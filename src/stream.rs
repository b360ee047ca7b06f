// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Transport handles usable by both halves of the codec.
//!
//! `std::net::TcpStream` already implements `Read`/`Write` for `&TcpStream`, which is the
//! standard way to drive one socket from two threads (one reader, one writer-under-a-lock). This
//! module wraps that in an owned, `Clone`-able handle so the codec doesn't need to special-case
//! the transport type.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

/// A handle that can be cleanly shut down independent of any in-flight reads/writes.
pub trait StreamClose {
    fn close(&self) -> io::Result<()>;
}

/// A cloneable handle onto a `TcpStream`. Reads and writes on distinct clones operate on the same
/// underlying socket, so one clone can be handed to a reader thread and another, wrapped in a
/// `Mutex`, to every thread that needs to write a response.
#[derive(Clone)]
pub struct TcpHandle(Arc<TcpStream>);

impl TcpHandle {
    pub fn new(stream: TcpStream) -> Self {
        Self(Arc::new(stream))
    }
}

impl Read for TcpHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.0).read(buf)
    }
}

impl Write for TcpHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

impl StreamClose for TcpHandle {
    fn close(&self) -> io::Result<()> {
        // Either half shutting down the socket is enough to unblock the other half's
        // in-progress or next read/write.
        match self.0.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already shut down by the other half; not an error from the caller's perspective.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// An "pipe", constructed using socketpair(2), that can be used for testing codec and connection
/// behavior without binding a real socket.
pub mod pipe {
    use super::*;
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
    use std::os::fd::{AsRawFd, OwnedFd, RawFd};

    pub struct Endpoint {
        fd: Arc<OwnedFd>,
    }

    impl Endpoint {
        fn raw(&self) -> RawFd {
            self.fd.as_raw_fd()
        }
    }

    impl Clone for Endpoint {
        fn clone(&self) -> Self {
            Self {
                fd: Arc::clone(&self.fd),
            }
        }
    }

    // SAFETY note: both read and write below go through `&self.fd` (an `AsFd`), matching the
    // calling convention `rpc_protocol::pipe::Endpoint` uses for `nix::unistd::{read,write}`.

    pub fn pipe() -> io::Result<(Endpoint, Endpoint)> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )?;

        Ok((
            Endpoint { fd: Arc::new(a) },
            Endpoint {
                fd: Arc::new(b),
            },
        ))
    }

    impl Read for Endpoint {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            Ok(nix::unistd::read(&*self.fd, buf)?)
        }
    }

    impl Write for Endpoint {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(nix::unistd::write(&*self.fd, buf)?)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StreamClose for Endpoint {
        fn close(&self) -> io::Result<()> {
            // shutdown(2) on a socketpair endpoint; ENOTCONN if the peer already closed.
            match nix::sys::socket::shutdown(self.raw(), nix::sys::socket::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(nix::Error::ENOTCONN) => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}
