// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

/// Top-level error type returned by client and server operations.
#[derive(Debug)]
pub enum Error {
    /// Protocol errors are returned before a connection even reaches dispatch: bad magic, an
    /// unknown codec tag, or a malformed option/header.
    Protocol(ProtocolError),

    /// A call-level error: the service/method couldn't be resolved, or the handler itself
    /// returned an error. The connection stays healthy; only the one call is affected.
    Rpc(String),

    /// The client (or server handler-timeout path) gave up waiting.
    ConnectTimeout(std::time::Duration),

    /// `close()` was called twice, or a send was attempted after shutdown.
    Shutdown,

    /// I/O failure reading or writing the transport.
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Rpc(e) => write!(f, "rpc error: {e}"),
            Self::ConnectTimeout(d) => write!(f, "rpc client: connect timeout: expect within {d:?}"),
            Self::Shutdown => write!(f, "connection is already shut down"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io) => Self::Io(io),
            other => Self::Protocol(ProtocolError::Decode(other.to_string())),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    /// Generic header/option decoding error, with a human-readable cause.
    Decode(String),

    /// Connection prelude's magic `option_identify` didn't match.
    WrongIdentify(u32),

    /// `CodecType` named a tag not present in the codec registry.
    UnknownCodec(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "error decoding: {msg}"),
            Self::WrongIdentify(got) => {
                write!(f, "invalid identifier {got:#x}")
            }
            Self::UnknownCodec(tag) => write!(f, "invalid codec type {tag}"),
        }
    }
}

/// Errors that can arise while reading or writing a single framed codec record.
#[derive(Debug)]
pub enum CodecError {
    Io(std::io::Error),
    Encode(String),
    Decode(String),
}

impl std::error::Error for CodecError {}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Whether the `Io` variant of a `CodecError` represents a clean end-of-stream.
impl CodecError {
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            Self::Io(e)
                if e.kind() == std::io::ErrorKind::UnexpectedEof
                    || e.kind() == std::io::ErrorKind::ConnectionReset
        )
    }
}

/// Errors surfaced by the server-side dispatch path (service/method resolution, handler
/// execution).
#[derive(Debug)]
pub enum DispatchError {
    /// `ServiceMethod` had no `.` separator, or the part before/after it was empty.
    IllFormed(String),

    /// No service registered under that name.
    UnknownService(String),

    /// The service exists but has no method by that name.
    UnknownMethod { service: String, method: String },

    /// `Server::register` was called twice with the same service name.
    DuplicateService(String),

    /// The service name must start with an uppercase ASCII letter.
    NotExported(String),

    /// The argument body failed to decode into the method's argument type.
    GarbageArgs(String),

    /// The handler itself returned an error.
    Handler(String),

    /// The handler did not finish within `handle_timeout`.
    HandleTimeout(std::time::Duration),
}

impl std::error::Error for DispatchError {}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllFormed(s) => write!(f, "rpc server: service/method request ill-formed: {s}"),
            Self::UnknownService(s) => write!(f, "rpc server: can't find service {s}"),
            Self::UnknownMethod { service, method } => {
                write!(f, "rpc server: can't find method {method} for service {service}")
            }
            Self::DuplicateService(s) => write!(f, "rpc server: service already defined: {s}"),
            Self::NotExported(s) => write!(f, "rpc server: {s} is not a valid service name"),
            Self::GarbageArgs(e) => write!(f, "rpc server: reading body: {e}"),
            Self::Handler(e) => write!(f, "{e}"),
            Self::HandleTimeout(d) => write!(f, "rpc server: handler timeout after {d:?}"),
        }
    }
}
