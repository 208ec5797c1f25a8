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

use crate::{
    Fork, Slot,
    mainnet::{
        AltairSignedBeaconBlock, BellatrixSignedBeaconBlock, BlobSidecar,
        CapellaSignedBeaconBlock, DenebSignedBeaconBlock, Phase0SignedBeaconBlock,
    },
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown block version {0}")]
    UnknownSchemaVersion(String),
    #[error("failed to decode {version} block: {source}")]
    Json {
        version: Fork,
        #[source]
        source: serde_json::Error,
    },
}

/// A signed beacon block tagged with the fork whose schema it follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedBlock {
    Phase0(Box<Phase0SignedBeaconBlock>),
    Altair(Box<AltairSignedBeaconBlock>),
    Bellatrix(Box<BellatrixSignedBeaconBlock>),
    Capella(Box<CapellaSignedBeaconBlock>),
    Deneb {
        block: Box<DenebSignedBeaconBlock>,
        blob_sidecars: Vec<BlobSidecar>,
    },
}

impl VersionedBlock {
    /// Decodes the `data` member of an `eth/v2/beacon/blocks` response whose
    /// `version` member is `version`.
    pub fn from_api(version: &str, data: serde_json::Value) -> Result<Self, DecodeError> {
        fn decode<T: serde::de::DeserializeOwned>(
            version: Fork,
            data: serde_json::Value,
        ) -> Result<Box<T>, DecodeError> {
            serde_json::from_value(data)
                .map(Box::new)
                .map_err(|source| DecodeError::Json { version, source })
        }

        match version {
            "phase0" => decode(Fork::Phase0, data).map(Self::Phase0),
            "altair" => decode(Fork::Altair, data).map(Self::Altair),
            "bellatrix" => decode(Fork::Bellatrix, data).map(Self::Bellatrix),
            "capella" => decode(Fork::Capella, data).map(Self::Capella),
            "deneb" => decode(Fork::Deneb, data).map(|block| Self::Deneb {
                block,
                blob_sidecars: Vec::new(),
            }),
            other => Err(DecodeError::UnknownSchemaVersion(other.to_string())),
        }
    }

    pub fn version(&self) -> Fork {
        match self {
            Self::Phase0(_) => Fork::Phase0,
            Self::Altair(_) => Fork::Altair,
            Self::Bellatrix(_) => Fork::Bellatrix,
            Self::Capella(_) => Fork::Capella,
            Self::Deneb { .. } => Fork::Deneb,
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            Self::Phase0(b) => b.message.slot,
            Self::Altair(b) => b.message.slot,
            Self::Bellatrix(b) => b.message.slot,
            Self::Capella(b) => b.message.slot,
            Self::Deneb { block, .. } => block.message.slot,
        }
    }

    /// Whether the block's schema has associated blob sidecars to fetch.
    pub fn has_blob_sidecars(&self) -> bool {
        matches!(self, Self::Deneb { .. })
    }

    /// Attaches blob sidecars to a Deneb block. Other versions are returned
    /// unchanged.
    pub fn with_blob_sidecars(self, sidecars: Vec<BlobSidecar>) -> Self {
        match self {
            Self::Deneb { block, .. } => Self::Deneb {
                block,
                blob_sidecars: sidecars,
            },
            other => other,
        }
    }

    pub fn blob_sidecars(&self) -> &[BlobSidecar] {
        match self {
            Self::Deneb { blob_sidecars, .. } => blob_sidecars,
            _ => &[],
        }
    }
}

impl From<Phase0SignedBeaconBlock> for VersionedBlock {
    fn from(block: Phase0SignedBeaconBlock) -> Self {
        Self::Phase0(Box::new(block))
    }
}

impl From<AltairSignedBeaconBlock> for VersionedBlock {
    fn from(block: AltairSignedBeaconBlock) -> Self {
        Self::Altair(Box::new(block))
    }
}

impl From<BellatrixSignedBeaconBlock> for VersionedBlock {
    fn from(block: BellatrixSignedBeaconBlock) -> Self {
        Self::Bellatrix(Box::new(block))
    }
}

impl From<CapellaSignedBeaconBlock> for VersionedBlock {
    fn from(block: CapellaSignedBeaconBlock) -> Self {
        Self::Capella(Box::new(block))
    }
}

impl From<DenebSignedBeaconBlock> for VersionedBlock {
    fn from(block: DenebSignedBeaconBlock) -> Self {
        Self::Deneb {
            block: Box::new(block),
            blob_sidecars: Vec::new(),
        }
    }
}
