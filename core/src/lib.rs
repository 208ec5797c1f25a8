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

//! Core logic for reporting on a single beacon block: converting wall-clock
//! time to slots, decoding the fork-versioned block envelope and rendering it
//! as JSON, SSZ or text.

mod block;
mod describe;
mod render;
mod slot_resolver;
mod timing;

pub use block::*;
pub use describe::*;
pub use render::*;
pub use slot_resolver::*;
pub use timing::*;

pub use ethereum_consensus::Fork;

pub type Slot = ethereum_consensus::primitives::Slot;
pub type Epoch = ethereum_consensus::primitives::Epoch;
pub type Root = ethereum_consensus::primitives::Root;

// all supported networks use the mainnet preset
pub mod mainnet {
    pub use ethereum_consensus::{
        altair::mainnet::SignedBeaconBlock as AltairSignedBeaconBlock,
        bellatrix::mainnet::SignedBeaconBlock as BellatrixSignedBeaconBlock,
        capella::mainnet::SignedBeaconBlock as CapellaSignedBeaconBlock,
        deneb::mainnet::{BlobSidecar, SignedBeaconBlock as DenebSignedBeaconBlock},
        phase0::mainnet::SignedBeaconBlock as Phase0SignedBeaconBlock,
    };
}
