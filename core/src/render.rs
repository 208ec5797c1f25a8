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

use crate::{Fork, NetworkTiming, VersionedBlock, describe::describe};
use std::fmt;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{mode} output is not available for {version} blocks")]
    UnsupportedCombination { version: Fork, mode: OutputMode },
    #[error("failed to generate JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to generate SSZ: {0}")]
    Ssz(#[from] ssz_rs::SerializeError),
    #[error("failed to compute block root: {0}")]
    Merkleization(#[from] ssz_rs::MerkleizationError),
    #[error("failed to generate text: {0}")]
    Text(#[from] fmt::Error),
}

/// The single output encoding used for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Full block as beacon-API JSON on one line.
    Json,
    /// Hex-encoded SSZ bytes on one line.
    Ssz,
    /// Human-readable report.
    #[default]
    Text,
}

impl OutputMode {
    /// Picks the mode from command line flags; JSON wins over SSZ, which
    /// wins over text.
    pub fn from_flags(json: bool, ssz: bool) -> Self {
        match (json, ssz) {
            (true, _) => Self::Json,
            (false, true) => Self::Ssz,
            (false, false) => Self::Text,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Json => write!(f, "json"),
            OutputMode::Ssz => write!(f, "ssz"),
            OutputMode::Text => write!(f, "text"),
        }
    }
}

/// Per-run rendering context.
#[derive(Debug, Clone, Copy)]
pub struct BlockRenderer {
    mode: OutputMode,
    timing: NetworkTiming,
    verbose: bool,
}

impl BlockRenderer {
    pub fn new(mode: OutputMode, timing: NetworkTiming) -> Self {
        Self {
            mode,
            timing,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Produces the complete output for `block`.
    ///
    /// Nothing is returned unless the whole block renders, so callers can
    /// write the result in one go.
    pub fn render(&self, block: &VersionedBlock) -> Result<String, RenderError> {
        trace!(version = %block.version(), slot = block.slot(), mode = %self.mode, "Rendering block");
        match self.mode {
            OutputMode::Json => render_json(block),
            OutputMode::Ssz => render_ssz(block, self.mode),
            OutputMode::Text => Ok(describe(block, &self.timing, self.verbose)?),
        }
    }
}

fn render_json(block: &VersionedBlock) -> Result<String, RenderError> {
    let mut out = match block {
        VersionedBlock::Phase0(b) => serde_json::to_string(b)?,
        VersionedBlock::Altair(b) => serde_json::to_string(b)?,
        VersionedBlock::Bellatrix(b) => serde_json::to_string(b)?,
        VersionedBlock::Capella(b) => serde_json::to_string(b)?,
        VersionedBlock::Deneb { block, .. } => serde_json::to_string(block)?,
    };
    out.push('\n');
    Ok(out)
}

// Sidecars are not part of the SSZ output; only the block itself is encoded.
fn render_ssz(block: &VersionedBlock, mode: OutputMode) -> Result<String, RenderError> {
    let bytes = match block {
        VersionedBlock::Phase0(_) => {
            return Err(RenderError::UnsupportedCombination {
                version: Fork::Phase0,
                mode,
            });
        }
        VersionedBlock::Altair(b) => ssz_rs::serialize(b.as_ref())?,
        VersionedBlock::Bellatrix(b) => ssz_rs::serialize(b.as_ref())?,
        VersionedBlock::Capella(b) => ssz_rs::serialize(b.as_ref())?,
        VersionedBlock::Deneb { block, .. } => ssz_rs::serialize(block.as_ref())?,
    };
    let mut out = hex::encode(bytes);
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mainnet::{
        AltairSignedBeaconBlock, BlobSidecar, CapellaSignedBeaconBlock, DenebSignedBeaconBlock,
        Phase0SignedBeaconBlock,
    };
    use std::time::Duration;

    fn renderer(mode: OutputMode) -> BlockRenderer {
        let timing = NetworkTiming::new(1606824023, Duration::from_secs(12), 32).unwrap();
        BlockRenderer::new(mode, timing)
    }

    #[test]
    fn flag_priority() {
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(true, false), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(false, true), OutputMode::Ssz);
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Text);
    }

    #[test]
    fn json_is_lossless() {
        let mut block = CapellaSignedBeaconBlock::default();
        block.message.slot = 7000000;
        block.message.proposer_index = 1234;
        let original = VersionedBlock::from(block);

        let out = renderer(OutputMode::Json).render(&original).unwrap();
        assert!(out.ends_with('\n'));
        assert_eq!(out.lines().count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(VersionedBlock::from_api("capella", parsed).unwrap(), original);
    }

    #[test]
    fn ssz_is_hex_of_the_block_encoding() {
        let mut block = AltairSignedBeaconBlock::default();
        block.message.slot = 74240;
        let expected = hex::encode(ssz_rs::serialize(&block).unwrap());

        let out = renderer(OutputMode::Ssz)
            .render(&VersionedBlock::from(block))
            .unwrap();
        assert_eq!(out, format!("{expected}\n"));
    }

    #[test]
    fn deneb_ssz_excludes_sidecars() {
        let block = DenebSignedBeaconBlock::default();
        let expected = hex::encode(ssz_rs::serialize(&block).unwrap());

        let versioned = VersionedBlock::from(block).with_blob_sidecars(vec![BlobSidecar::default()]);
        let out = renderer(OutputMode::Ssz).render(&versioned).unwrap();
        assert_eq!(out.trim_end(), expected);
    }

    #[test]
    fn phase0_ssz_is_unsupported() {
        let block = VersionedBlock::from(Phase0SignedBeaconBlock::default());
        let err = renderer(OutputMode::Ssz).render(&block).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedCombination {
                version: Fork::Phase0,
                mode: OutputMode::Ssz
            }
        ));

        // the other modes still work for phase0
        assert!(renderer(OutputMode::Json).render(&block).is_ok());
        assert!(renderer(OutputMode::Text).render(&block).is_ok());
    }
}
