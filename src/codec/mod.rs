// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The codec layer: a framed read/write contract for a header and a body over a byte stream, plus
//! a tag -> codec registry.
//!
//! The codec tag governs how the `Header` is encoded (so a `application/json` connection gets
//! human-readable headers on the wire). Body bytes are handled opaquely here: the service registry
//! (`crate::service`) and the client multiplexer (`crate::client`) are built once, independent of
//! any single connection's negotiated codec, so they need one unambiguous binary format to
//! type-erase argument/reply values against. That format is the compact binary encoding produced
//! by `bincode`, applied uniformly regardless of the header codec tag. `Codec` itself never
//! inspects body bytes; it just frames and forwards them.

pub(crate) mod framing;

use crate::error::CodecError;
use crate::stream::StreamClose;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Read, Write};
use std::sync::Mutex;

/// The per-message envelope: service.method, sequence, error string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "ServiceMethod")]
    pub service_method: String,

    #[serde(rename = "Seq")]
    pub seq: u64,

    #[serde(rename = "Err")]
    pub err: String,
}

/// Which concrete wire encoding a codec tag names. Only affects `Header` encoding; see module
/// docs for why body bytes bypass this entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Gob,
    Json,
}

impl CodecKind {
    pub const GOB_TAG: &'static str = "application/gob";
    pub const JSON_TAG: &'static str = "application/json";

    /// The codec registry: maps a wire tag to a concrete codec. Unknown tags return `None`, which
    /// the server interprets as "close the connection" and the client as "fail `dial`".
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            Self::GOB_TAG => Some(Self::Gob),
            Self::JSON_TAG => Some(Self::Json),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Gob => Self::GOB_TAG,
            Self::Json => Self::JSON_TAG,
        }
    }

    fn encode_header(&self, header: &Header) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Gob => {
                bincode::serialize(header).map_err(|e| CodecError::Encode(e.to_string()))
            }
            Self::Json => {
                serde_json::to_vec(header).map_err(|e| CodecError::Encode(e.to_string()))
            }
        }
    }

    fn decode_header(&self, bytes: &[u8]) -> Result<Header, CodecError> {
        match self {
            Self::Gob => {
                bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
        }
    }
}

/// Encode a value to the uniform body wire format (always bincode; see module docs).
pub fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value from the uniform body wire format.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// A codec wraps a bidirectional byte stream, offering `read_header`/`read_body_bytes`/`write`/
/// `close`. Both the reader and writer halves sit behind their own mutex so a `Codec` can be
/// shared via `Arc` across the connection's request-loop thread and its worker threads: in
/// practice only the request-loop thread ever calls the read methods, but locking (rather than
/// requiring `&mut`) lets the type be shared without `unsafe`.
pub struct Codec<S> {
    kind: CodecKind,
    reader: Mutex<S>,
    writer: Mutex<BufWriter<S>>,
}

impl<S: Read + Write + StreamClose> Codec<S> {
    /// `reader` and `writer` are independent handles onto the same underlying stream (e.g. two
    /// clones of a `TcpHandle`).
    pub fn new(kind: CodecKind, reader: S, writer: S) -> Self {
        Self {
            kind,
            reader: Mutex::new(reader),
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Decode exactly one `Header` record. Returns `Err` with `CodecError::is_eof()` true when the
    /// peer closed the connection cleanly between records.
    pub fn read_header(&self) -> Result<Header, CodecError> {
        let mut r = self.reader.lock().expect("codec reader mutex poisoned");
        let bytes = framing::read_frame(&mut *r)?;
        self.kind.decode_header(&bytes)
    }

    /// Read exactly one raw (already-encoded) body record.
    pub fn read_body_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut r = self.reader.lock().expect("codec reader mutex poisoned");
        framing::read_frame(&mut *r)
    }

    /// Write a header + pre-encoded body pair, atomically with respect to any other `write` call
    /// on this codec. On any encode or I/O error, closes the underlying stream before returning.
    pub fn write(&self, header: &Header, body_bytes: &[u8]) -> Result<(), CodecError> {
        let result = self.write_inner(header, body_bytes);
        if result.is_err() {
            let _ = self.close();
        }
        result
    }

    fn write_inner(&self, header: &Header, body_bytes: &[u8]) -> Result<(), CodecError> {
        let header_bytes = self.kind.encode_header(header)?;

        let mut w = self.writer.lock().expect("codec writer mutex poisoned");
        framing::write_frame(&mut *w, &header_bytes)?;
        framing::write_frame(&mut *w, body_bytes)?;
        w.flush()?;
        Ok(())
    }

    pub fn close(&self) -> std::io::Result<()> {
        self.writer
            .lock()
            .expect("codec writer mutex poisoned")
            .get_ref()
            .close()
    }
}
