// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The connection prelude: a small, codec-agnostic handshake carried as JSON ahead of the
//! codec-selected stream of (Header, Body) pairs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Magic identifying this as an `rpc_runtime` connection. Decimal 3268521.
pub const OPTION_IDENTIFY: u32 = 0x31DFA9;

/// The default body codec, required of every implementation.
pub const DEFAULT_CODEC_TAG: &str = "application/gob";

/// Connection prelude. Always encoded as JSON, regardless of `codec_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcOption {
    #[serde(rename = "OptionIdentify")]
    pub option_identify: u32,

    #[serde(rename = "CodecType")]
    pub codec_type: String,

    /// Milliseconds; 0 = unbounded. `Duration` itself isn't portably JSON-shaped, so the wire
    /// representation is an integer count of milliseconds.
    #[serde(rename = "ConnectTimeout")]
    pub connect_timeout_ms: u64,

    #[serde(rename = "HandleTimeout")]
    pub handle_timeout_ms: u64,
}

impl Default for RpcOption {
    fn default() -> Self {
        Self {
            option_identify: OPTION_IDENTIFY,
            codec_type: DEFAULT_CODEC_TAG.to_string(),
            connect_timeout_ms: 10_000,
            handle_timeout_ms: 0,
        }
    }
}

impl RpcOption {
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_duration(self.connect_timeout_ms)
    }

    pub fn handle_timeout(&self) -> Option<Duration> {
        non_zero_duration(self.handle_timeout_ms)
    }

    /// Overlay a user-supplied option on top of the default: the magic is always forced to the
    /// default, and an empty codec tag falls back to the default tag.
    pub fn overlay(user: Option<RpcOption>) -> RpcOption {
        let mut opt = user.unwrap_or_default();
        opt.option_identify = OPTION_IDENTIFY;
        if opt.codec_type.is_empty() {
            opt.codec_type = DEFAULT_CODEC_TAG.to_string();
        }
        opt
    }

    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout_ms = d.as_millis() as u64;
        self
    }

    pub fn with_handle_timeout(mut self, d: Duration) -> Self {
        self.handle_timeout_ms = d.as_millis() as u64;
        self
    }

    pub fn with_codec_tag(mut self, tag: impl Into<String>) -> Self {
        self.codec_type = tag.into();
        self
    }
}

fn non_zero_duration(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
