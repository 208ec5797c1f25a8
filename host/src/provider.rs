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

use std::collections::HashMap;

use async_trait::async_trait;
use blockinfo_core::{VersionedBlock, mainnet::BlobSidecar};
use futures::{StreamExt, stream::BoxStream};

use crate::beacon_client::{BeaconClient, EventKind, EventTopic};

pub type EventStream = BoxStream<'static, Result<EventKind, anyhow::Error>>;

/// The beacon node queries needed to report on blocks.
#[async_trait]
pub trait BeaconProvider: Send + Sync {
    /// Returns the network configuration map (`SECONDS_PER_SLOT`, `SLOTS_PER_EPOCH`, ...).
    async fn spec(&self) -> Result<HashMap<String, serde_json::Value>, anyhow::Error>;

    /// Returns the genesis time as unix seconds.
    async fn genesis_time(&self) -> Result<u64, anyhow::Error>;

    /// Returns the block for `block_id`, or `None` if there is no such block.
    async fn signed_block(&self, block_id: &str) -> Result<Option<VersionedBlock>, anyhow::Error>;

    async fn blob_sidecars(&self, block_id: &str) -> Result<Vec<BlobSidecar>, anyhow::Error>;

    /// Subscribes to the given event topics.
    async fn events(&self, topics: &[EventTopic]) -> Result<EventStream, anyhow::Error>;
}

#[async_trait]
impl BeaconProvider for BeaconClient {
    async fn spec(&self) -> Result<HashMap<String, serde_json::Value>, anyhow::Error> {
        Ok(self.get_spec().await?)
    }

    async fn genesis_time(&self) -> Result<u64, anyhow::Error> {
        Ok(self.get_genesis_time().await?)
    }

    async fn signed_block(&self, block_id: &str) -> Result<Option<VersionedBlock>, anyhow::Error> {
        Ok(self.get_block(block_id).await?)
    }

    async fn blob_sidecars(&self, block_id: &str) -> Result<Vec<BlobSidecar>, anyhow::Error> {
        Ok(self.get_blob_sidecars(block_id).await?)
    }

    async fn events(&self, topics: &[EventTopic]) -> Result<EventStream, anyhow::Error> {
        let stream = self.get_events(topics).await?;
        Ok(stream.map(|event| event.map_err(anyhow::Error::from)).boxed())
    }
}
