// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Every codec-level record — the handshake option, each header, each body — is written as a
//! 4-byte big-endian length prefix followed by exactly that many encoded bytes. This keeps the
//! binary and JSON backends both trivially re-synchronizable: a reader never has to guess where
//! one value's encoding ends and the next begins (see DESIGN.md for why the upstream source's
//! reliance on the encoding's own self-delimiting behavior is not something this implementation
//! carries over).

use crate::error::CodecError;
use std::io::{Read, Write};

/// Maximum size of a single framed record. Large enough for any reasonable RPC payload; guards
/// against treating a corrupt or non-protocol stream as an enormous allocation request.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

pub fn write_frame<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CodecError::Encode("frame too large to encode".to_string()))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

pub fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>, CodecError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::Decode(format!(
            "frame length {len} exceeds maximum {MAX_FRAME_LEN}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
