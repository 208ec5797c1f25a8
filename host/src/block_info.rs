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

//! Fetches a single block and renders it, optionally following the chain
//! head afterwards.

use std::{future::Future, io::Write};

use blockinfo_core::{
    BlockRenderer, ConfigError, NetworkTiming, OutputMode, RenderError, ResolveError, Root,
    SlotResolver, VersionedBlock,
};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    beacon_client::{EventKind, EventTopic},
    provider::BeaconProvider,
};

#[derive(Debug, Error)]
pub enum BlockInfoError {
    #[error("{0}")]
    Usage(&'static str),
    #[error("failed to obtain configuration information: {0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    Timing(#[from] ConfigError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to obtain beacon block: {0:#}")]
    Fetch(anyhow::Error),
    #[error("failed to obtain blobs: {0:#}")]
    Blobs(anyhow::Error),
    #[error("empty beacon block")]
    EmptyBlock,
    #[error("failed to output block: {0}")]
    Render(#[from] RenderError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to start block stream: {0:#}")]
    Events(anyhow::Error),
}

/// The block to report on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Identifier understood by the beacon node: slot, root, `head`, ...
    BlockId(String),
    /// Block time, resolved to a slot before fetching.
    Time(String),
}

impl Target {
    pub fn from_options(
        block_id: Option<String>,
        time: Option<String>,
    ) -> Result<Self, BlockInfoError> {
        match (block_id, time) {
            (Some(block_id), None) => Ok(Self::BlockId(block_id)),
            (None, Some(time)) => Ok(Self::Time(time)),
            (None, None) => Err(BlockInfoError::Usage("no block ID or block time")),
            (Some(_), Some(_)) => Err(BlockInfoError::Usage(
                "only one of block ID and block time may be given",
            )),
        }
    }
}

/// What to do when fetching or rendering a streamed head block fails.
///
/// Failing to write the output always stops the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventErrorPolicy {
    /// Log the failure and wait for the next event.
    #[default]
    LogAndContinue,
    /// Stop streaming and return the failure.
    Abort,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub target: Target,
    pub mode: OutputMode,
    /// Keep rendering every new chain head after the requested block.
    pub stream: bool,
    /// Only check that the block exists; nothing is rendered.
    pub quiet: bool,
    pub verbose: bool,
    pub on_event_error: EventErrorPolicy,
}

impl Request {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            mode: OutputMode::default(),
            stream: false,
            quiet: false,
            verbose: false,
            on_event_error: EventErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Quiet mode: the block exists.
    Exists,
    /// Quiet mode: there is no such block.
    Missing,
    /// The block was rendered, followed by `streamed` head blocks.
    Rendered { streamed: usize },
}

pub struct BlockInfo<P> {
    provider: P,
}

impl<P: BeaconProvider> BlockInfo<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    pub async fn network_timing(&self) -> Result<NetworkTiming, BlockInfoError> {
        let spec = self.provider.spec().await.map_err(BlockInfoError::Config)?;
        let genesis_time = self
            .provider
            .genesis_time()
            .await
            .map_err(BlockInfoError::Config)?;
        Ok(NetworkTiming::from_spec(&spec, genesis_time)?)
    }

    /// Runs `request`, writing rendered blocks to `out`.
    ///
    /// When streaming, this only returns once `shutdown` completes (or a
    /// head event fails under [EventErrorPolicy::Abort]). A render that has
    /// started always finishes before shutdown is observed.
    pub async fn run<W, F>(
        &self,
        request: &Request,
        out: &mut W,
        shutdown: F,
    ) -> Result<Outcome, BlockInfoError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let timing = self.network_timing().await?;
        debug!(?timing, "Obtained network timing");

        let block_id = match &request.target {
            Target::BlockId(block_id) => block_id.clone(),
            Target::Time(time) => SlotResolver::new(&timing).resolve(time)?,
        };

        let block = self
            .provider
            .signed_block(&block_id)
            .await
            .map_err(BlockInfoError::Fetch)?;
        if request.quiet {
            return Ok(match block {
                Some(_) => Outcome::Exists,
                None => Outcome::Missing,
            });
        }
        let block = block.ok_or(BlockInfoError::EmptyBlock)?;
        let block = self.attach_blob_sidecars(block, &block_id).await?;

        let renderer = BlockRenderer::new(request.mode, timing).with_verbose(request.verbose);
        write_block(&renderer, &block, request.stream, out)?;

        if !request.stream {
            return Ok(Outcome::Rendered { streamed: 0 });
        }
        let streamed = self
            .stream(&renderer, request.on_event_error, out, shutdown)
            .await?;
        Ok(Outcome::Rendered { streamed })
    }

    /// Fetches `block_id` along with its blob sidecars, if it has any.
    pub async fn fetch(&self, block_id: &str) -> Result<VersionedBlock, BlockInfoError> {
        let block = self
            .provider
            .signed_block(block_id)
            .await
            .map_err(BlockInfoError::Fetch)?
            .ok_or(BlockInfoError::EmptyBlock)?;
        self.attach_blob_sidecars(block, block_id).await
    }

    async fn attach_blob_sidecars(
        &self,
        block: VersionedBlock,
        block_id: &str,
    ) -> Result<VersionedBlock, BlockInfoError> {
        if !block.has_blob_sidecars() {
            return Ok(block);
        }
        let sidecars = self
            .provider
            .blob_sidecars(block_id)
            .await
            .map_err(BlockInfoError::Blobs)?;
        trace!(count = sidecars.len(), "Obtained blob sidecars");
        Ok(block.with_blob_sidecars(sidecars))
    }

    async fn stream<W, F>(
        &self,
        renderer: &BlockRenderer,
        policy: EventErrorPolicy,
        out: &mut W,
        shutdown: F,
    ) -> Result<usize, BlockInfoError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let mut events = self
            .provider
            .events(&[EventTopic::Head])
            .await
            .map_err(BlockInfoError::Events)?;
        info!("Block stream started");

        tokio::pin!(shutdown);
        let mut streamed = 0;
        let mut closed = false;
        loop {
            tokio::select! {
                biased;
                event = events.next() => match event {
                    Some(Ok(EventKind::Head(head))) => {
                        let block_id = root_block_id(&head.block);
                        debug!(slot = head.slot, %block_id, "New head");
                        let result = match self.fetch(&block_id).await {
                            Ok(block) => write_block(renderer, &block, true, out),
                            Err(e) => Err(e),
                        };
                        match result {
                            Ok(()) => streamed += 1,
                            // a closed sink stays closed
                            Err(e @ BlockInfoError::Output(_)) => return Err(e),
                            Err(e) if policy == EventErrorPolicy::LogAndContinue => {
                                warn!("Failed to output block {block_id}: {e}");
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Some(Ok(other)) => trace!(topic = %other.topic(), "Ignoring event"),
                    Some(Err(e)) => warn!("Block stream error: {e:#}"),
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        if closed {
            warn!("Block stream closed by the beacon node");
            shutdown.await;
        }
        info!(streamed, "Block stream stopped");
        Ok(streamed)
    }
}

/// Block identifier for a block root, as accepted by the beacon API.
pub fn root_block_id(root: &Root) -> String {
    format!("0x{}", hex::encode(root))
}

/// Renders `block` and writes it out in one piece. Streamed text output is
/// followed by a blank line.
fn write_block<W: Write>(
    renderer: &BlockRenderer,
    block: &VersionedBlock,
    streaming: bool,
    out: &mut W,
) -> Result<(), BlockInfoError> {
    let mut rendered = renderer.render(block)?;
    if streaming && renderer.mode().is_text() {
        rendered.push('\n');
    }
    out.write_all(rendered.as_bytes())?;
    out.flush()?;
    Ok(())
}
