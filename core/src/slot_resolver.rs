// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::NetworkTiming;
use chrono::{Local, NaiveDateTime, TimeZone};
use std::num::ParseIntError;
use thiserror::Error;
use tracing::{debug, warn};

/// Layout accepted for date-time block times, e.g. `2006-01-02T15:04:05`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("failed to parse block time as hex string: {0}")]
    Hex(ParseIntError),
    #[error("failed to parse block time as decimal string: {0}")]
    Decimal(ParseIntError),
    #[error("failed to parse block time as datetime: {0}")]
    DateTime(chrono::ParseError),
    #[error("failed to parse block time as datetime: {0:?} is not in YYYY-MM-DDTHH:MM:SS form")]
    DateTimeLayout(String),
    #[error("block time {0} does not exist in the local time zone")]
    NonexistentLocalTime(NaiveDateTime),
}

/// A block time as supplied on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpression {
    /// `0x`-prefixed unix seconds.
    Hex(i64),
    /// Unix seconds.
    Decimal(i64),
    /// Wall-clock time without zone information.
    LocalDateTime(NaiveDateTime),
}

impl TimeExpression {
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        if let Some(hex) = input.strip_prefix("0x") {
            i64::from_str_radix(hex, 16)
                .map(Self::Hex)
                .map_err(ResolveError::Hex)
        } else if !input.contains(':') {
            input
                .parse::<i64>()
                .map(Self::Decimal)
                .map_err(ResolveError::Decimal)
        } else if !has_datetime_layout(input) {
            Err(ResolveError::DateTimeLayout(input.to_string()))
        } else {
            NaiveDateTime::parse_from_str(input, DATETIME_FORMAT)
                .map(Self::LocalDateTime)
                .map_err(ResolveError::DateTime)
        }
    }

    /// Unix timestamp of the expression, reading date-times as wall-clock
    /// time in `tz`.
    pub fn timestamp_in<Tz: TimeZone>(&self, tz: &Tz) -> Result<i64, ResolveError> {
        match self {
            Self::Hex(ts) | Self::Decimal(ts) => Ok(*ts),
            Self::LocalDateTime(dt) => tz
                .from_local_datetime(dt)
                .earliest()
                .map(|t| t.timestamp())
                .ok_or(ResolveError::NonexistentLocalTime(*dt)),
        }
    }
}

/// Checks the fixed-width layout chrono's specifiers do not enforce on their
/// own (they accept unpadded fields and signed years).
fn has_datetime_layout(input: &str) -> bool {
    input.len() == 19
        && input.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            10 => b == b'T',
            13 | 16 => b == b':',
            _ => b.is_ascii_digit(),
        })
}

/// Converts block times to slot identifiers.
#[derive(Debug, Clone, Copy)]
pub struct SlotResolver<'a> {
    timing: &'a NetworkTiming,
}

impl<'a> SlotResolver<'a> {
    pub fn new(timing: &'a NetworkTiming) -> Self {
        Self { timing }
    }

    /// Resolves `input` to a block identifier, reading date-times in the
    /// local time zone of the process.
    pub fn resolve(&self, input: &str) -> Result<String, ResolveError> {
        self.resolve_in(input, &Local)
    }

    pub fn resolve_in<Tz: TimeZone>(&self, input: &str, tz: &Tz) -> Result<String, ResolveError> {
        self.resolve_slot_in(input, tz).map(|slot| slot.to_string())
    }

    pub fn resolve_slot_in<Tz: TimeZone>(&self, input: &str, tz: &Tz) -> Result<i64, ResolveError> {
        let expression = TimeExpression::parse(input)?;
        let timestamp = expression.timestamp_in(tz)?;
        let slot = self.timing.timestamp_to_slot(timestamp);
        debug!(?expression, timestamp, slot, "Resolved block time");
        if slot < 0 {
            warn!(
                "Block time {} is before genesis ({}), resolved to slot {}",
                timestamp,
                self.timing.genesis_time(),
                slot
            );
        }
        Ok(slot)
    }
}
