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

use crate::{Epoch, Slot};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

const SECONDS_PER_SLOT: &str = "SECONDS_PER_SLOT";
const SLOT_DURATION_MS: &str = "SLOT_DURATION_MS";
const SLOTS_PER_EPOCH: &str = "SLOTS_PER_EPOCH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("network configuration is missing {0}")]
    MissingField(&'static str),
    #[error("network configuration has invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("slot duration must be a positive whole number of seconds, got {0:?}")]
    InvalidSlotDuration(Duration),
    #[error("slots per epoch must be positive")]
    ZeroSlotsPerEpoch,
}

/// Chain timing parameters, fetched once per run and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTiming {
    genesis_time: i64,
    slot_duration: Duration,
    slot_secs: i64,
    slots_per_epoch: u64,
}

impl NetworkTiming {
    pub fn new(
        genesis_time: i64,
        slot_duration: Duration,
        slots_per_epoch: u64,
    ) -> Result<Self, ConfigError> {
        let slot_secs = match i64::try_from(slot_duration.as_secs()) {
            Ok(secs) if secs > 0 && slot_duration.subsec_nanos() == 0 => secs,
            _ => return Err(ConfigError::InvalidSlotDuration(slot_duration)),
        };
        if slots_per_epoch == 0 {
            return Err(ConfigError::ZeroSlotsPerEpoch);
        }
        Ok(Self {
            genesis_time,
            slot_duration,
            slot_secs,
            slots_per_epoch,
        })
    }

    /// Builds the timing from the node's `config/spec` map and its genesis time.
    ///
    /// The beacon API encodes every value as a decimal string, but plain JSON
    /// numbers are accepted as well.
    pub fn from_spec(
        spec: &HashMap<String, serde_json::Value>,
        genesis_time: u64,
    ) -> Result<Self, ConfigError> {
        let slot_duration = match config_u64(spec, SECONDS_PER_SLOT) {
            Ok(secs) => Duration::from_secs(secs),
            Err(ConfigError::MissingField(_)) => {
                Duration::from_millis(config_u64(spec, SLOT_DURATION_MS)?)
            }
            Err(e) => return Err(e),
        };
        let slots_per_epoch = config_u64(spec, SLOTS_PER_EPOCH)?;
        let genesis_time = i64::try_from(genesis_time).map_err(|_| ConfigError::InvalidField {
            field: "genesis_time",
            value: genesis_time.to_string(),
        })?;

        Self::new(genesis_time, slot_duration, slots_per_epoch)
    }

    /// Unix timestamp (seconds) of the genesis block.
    pub fn genesis_time(&self) -> i64 {
        self.genesis_time
    }

    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    pub fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    /// Returns `floor((timestamp - genesis) / slot_duration)`.
    ///
    /// Timestamps before genesis yield negative slots.
    pub fn timestamp_to_slot(&self, timestamp: i64) -> i64 {
        timestamp
            .saturating_sub(self.genesis_time)
            .div_euclid(self.slot_secs)
    }

    /// Unix timestamp (seconds) at which `slot` starts.
    pub fn slot_start(&self, slot: Slot) -> i64 {
        let offset = slot.saturating_mul(self.slot_duration.as_secs());
        self.genesis_time
            .saturating_add(i64::try_from(offset).unwrap_or(i64::MAX))
    }

    pub fn epoch_at_slot(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }
}

fn config_u64(
    spec: &HashMap<String, serde_json::Value>,
    field: &'static str,
) -> Result<u64, ConfigError> {
    let value = spec.get(field).ok_or(ConfigError::MissingField(field))?;
    let parsed = match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::InvalidField {
        field,
        value: value.to_string(),
    })
}
