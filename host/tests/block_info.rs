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

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use blockinfo::{
    BeaconProvider, BlockInfo, BlockInfoError, EventErrorPolicy, EventKind, EventStream,
    EventTopic, Outcome, Request, SseBlock, SseFinalizedCheckpoint, SseHead, Target,
    root_block_id,
};
use blockinfo_core::{
    ConfigError, Fork, OutputMode, RenderError, Root, VersionedBlock,
    mainnet::{
        AltairSignedBeaconBlock, BlobSidecar, CapellaSignedBeaconBlock, DenebSignedBeaconBlock,
        Phase0SignedBeaconBlock,
    },
};
use futures::{StreamExt, stream};
use serde_json::json;
use test_log::test;

/// In-memory beacon node.
#[derive(Default)]
struct MockProvider {
    spec: HashMap<String, serde_json::Value>,
    genesis_time: u64,
    blocks: HashMap<String, VersionedBlock>,
    sidecars: HashMap<String, Vec<BlobSidecar>>,
    events: Mutex<Vec<Result<EventKind, String>>>,
    fail_spec: bool,
    block_requests: Mutex<Vec<String>>,
    sidecar_requests: Mutex<Vec<String>>,
}

impl MockProvider {
    fn new(genesis_time: u64) -> Self {
        let spec = HashMap::from([
            ("SECONDS_PER_SLOT".to_string(), json!("12")),
            ("SLOTS_PER_EPOCH".to_string(), json!("32")),
        ]);
        Self {
            spec,
            genesis_time,
            ..Default::default()
        }
    }

    fn with_block(
        mut self,
        block_id: impl Into<String>,
        block: impl Into<VersionedBlock>,
    ) -> Self {
        self.blocks.insert(block_id.into(), block.into());
        self
    }

    fn with_events(self, events: Vec<Result<EventKind, String>>) -> Self {
        *self.events.lock().unwrap() = events;
        self
    }

    fn block_requests(&self) -> Vec<String> {
        self.block_requests.lock().unwrap().clone()
    }

    fn sidecar_requests(&self) -> Vec<String> {
        self.sidecar_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BeaconProvider for MockProvider {
    async fn spec(&self) -> Result<HashMap<String, serde_json::Value>, anyhow::Error> {
        if self.fail_spec {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.spec.clone())
    }

    async fn genesis_time(&self) -> Result<u64, anyhow::Error> {
        Ok(self.genesis_time)
    }

    async fn signed_block(&self, block_id: &str) -> Result<Option<VersionedBlock>, anyhow::Error> {
        self.block_requests.lock().unwrap().push(block_id.to_string());
        Ok(self.blocks.get(block_id).cloned())
    }

    async fn blob_sidecars(&self, block_id: &str) -> Result<Vec<BlobSidecar>, anyhow::Error> {
        self.sidecar_requests.lock().unwrap().push(block_id.to_string());
        Ok(self.sidecars.get(block_id).cloned().unwrap_or_default())
    }

    async fn events(&self, topics: &[EventTopic]) -> Result<EventStream, anyhow::Error> {
        assert_eq!(topics, &[EventTopic::Head]);
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        Ok(stream::iter(events.into_iter().map(|e| e.map_err(|e| anyhow!(e)))).boxed())
    }
}

fn root(byte: u8) -> Root {
    serde_json::from_value(json!(format!("0x{}", hex::encode([byte; 32])))).unwrap()
}

fn head(slot: u64, block: Root) -> Result<EventKind, String> {
    Ok(EventKind::Head(SseHead {
        slot,
        block,
        ..Default::default()
    }))
}

fn capella(slot: u64) -> CapellaSignedBeaconBlock {
    let mut block = CapellaSignedBeaconBlock::default();
    block.message.slot = slot;
    block
}

fn request(target: Target) -> Request {
    Request::new(target)
}

async fn run(
    provider: MockProvider,
    request: &Request,
) -> (MockProvider, Result<Outcome, BlockInfoError>, String) {
    let block_info = BlockInfo::new(provider);
    let mut out = Vec::new();
    let result = block_info.run(request, &mut out, async {}).await;
    (block_info.into_provider(), result, String::from_utf8(out).unwrap())
}

#[test(tokio::test)]
async fn renders_block_by_id() {
    let provider = MockProvider::new(1606824023).with_block("head", capella(7000000));
    let (provider, result, out) = run(provider, &request(Target::BlockId("head".into()))).await;

    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 0 });
    assert!(out.starts_with("Version: "));
    assert!(out.contains("Slot: 7000000\n"));
    assert!(!out.ends_with("\n\n"));
    assert_eq!(provider.block_requests(), ["head"]);
    // only deneb blocks have blob sidecars
    assert!(provider.sidecar_requests().is_empty());
}

#[test(tokio::test)]
async fn resolves_time_to_slot() {
    let provider = MockProvider::new(0).with_block("8333333", capella(8333333));
    let (provider, result, out) =
        run(provider, &request(Target::Time("0x5f5e100".into()))).await;

    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 0 });
    assert!(out.contains("Slot: 8333333\n"));
    assert_eq!(provider.block_requests(), ["8333333"]);
}

#[test(tokio::test)]
async fn malformed_time_is_an_error() {
    let provider = MockProvider::new(0);
    let (provider, result, out) = run(provider, &request(Target::Time("0xzz".into()))).await;

    assert!(matches!(result, Err(BlockInfoError::Resolve(_))));
    assert!(out.is_empty());
    assert!(provider.block_requests().is_empty());
}

#[test(tokio::test)]
async fn missing_block_is_reported() {
    let provider = MockProvider::new(0);
    let (_, result, out) = run(provider, &request(Target::BlockId("123".into()))).await;

    let err = result.unwrap_err();
    assert!(matches!(err, BlockInfoError::EmptyBlock));
    assert_eq!(err.to_string(), "empty beacon block");
    assert!(out.is_empty());
}

#[test(tokio::test)]
async fn quiet_only_checks_existence() {
    let mut req = request(Target::BlockId("finalized".into()));
    req.quiet = true;

    let provider = MockProvider::new(0).with_block("finalized", DenebSignedBeaconBlock::default());
    let (provider, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Exists);
    assert!(out.is_empty());
    assert!(provider.sidecar_requests().is_empty());

    let (_, result, out) = run(MockProvider::new(0), &req).await;
    assert_eq!(result.unwrap(), Outcome::Missing);
    assert!(out.is_empty());
}

#[test(tokio::test)]
async fn phase0_ssz_is_unsupported() {
    let mut req = request(Target::BlockId("genesis".into()));
    req.mode = OutputMode::Ssz;

    let provider = MockProvider::new(0).with_block("genesis", Phase0SignedBeaconBlock::default());
    let (_, result, out) = run(provider, &req).await;
    assert!(matches!(
        result,
        Err(BlockInfoError::Render(RenderError::UnsupportedCombination {
            version: Fork::Phase0,
            mode: OutputMode::Ssz,
        }))
    ));
    assert!(out.is_empty());
}

#[test(tokio::test)]
async fn deneb_fetches_sidecars_with_same_id() {
    let mut provider = MockProvider::new(0).with_block("0xabc", DenebSignedBeaconBlock::default());
    provider
        .sidecars
        .insert("0xabc".into(), vec![BlobSidecar::default(), BlobSidecar::default()]);

    let (provider, result, out) = run(provider, &request(Target::BlockId("0xabc".into()))).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 0 });
    assert_eq!(provider.sidecar_requests(), ["0xabc"]);
    assert!(out.contains("Blob sidecars: 2\n"));
}

#[test(tokio::test)]
async fn streams_head_blocks_as_text() {
    let (a, b) = (root(0xaa), root(0xbb));
    let provider = MockProvider::new(0)
        .with_block("head", capella(100))
        .with_block(root_block_id(&a), capella(101))
        .with_block(root_block_id(&b), AltairSignedBeaconBlock::default())
        .with_events(vec![
            head(101, a),
            Err("connection reset".into()),
            head(102, b),
        ]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;

    let (provider, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 2 });

    let blocks: Vec<_> = out.split_terminator("\n\n").collect();
    assert_eq!(blocks.len(), 3);
    assert!(blocks.iter().all(|b| b.starts_with("Version: ")));
    assert!(blocks[0].contains("Slot: 100"));
    assert!(blocks[1].contains("Slot: 101"));
    assert!(out.ends_with("\n\n"));
    assert_eq!(
        provider.block_requests(),
        ["head".to_string(), root_block_id(&a), root_block_id(&b)]
    );
}

#[test(tokio::test)]
async fn streams_json_without_separators() {
    let a = root(0x01);
    let provider = MockProvider::new(0)
        .with_block("head", capella(5))
        .with_block(root_block_id(&a), capella(6))
        .with_events(vec![head(6, a)]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;
    req.mode = OutputMode::Json;

    let (_, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 1 });

    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("message").is_some());
    }
}

#[test(tokio::test)]
async fn stream_continues_after_failed_event() {
    let (missing, present) = (root(0x0f), root(0xf0));
    let provider = MockProvider::new(0)
        .with_block("head", capella(1))
        .with_block(root_block_id(&present), capella(3))
        .with_events(vec![head(2, missing), head(3, present)]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;

    let (_, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 1 });
    assert_eq!(out.matches("Version: ").count(), 2);
    assert!(out.contains("Slot: 3\n"));
}

#[test(tokio::test)]
async fn stream_continues_after_failed_render() {
    let (old, new, newer) = (root(0x00), root(0x01), root(0x02));
    let provider = MockProvider::new(0)
        .with_block("head", AltairSignedBeaconBlock::default())
        .with_block(root_block_id(&old), Phase0SignedBeaconBlock::default())
        .with_block(root_block_id(&new), capella(11))
        .with_block(root_block_id(&newer), capella(12))
        .with_events(vec![head(10, old), head(11, new), head(12, newer)]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;
    req.mode = OutputMode::Ssz;

    let (provider, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 2 });
    assert_eq!(provider.block_requests().len(), 4);

    // the phase0 block writes nothing, and ssz output has no separators
    assert!(!out.contains("\n\n"));
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        assert!(!line.is_empty());
        assert!(hex::decode(line).is_ok());
    }
    assert_ne!(lines[0], lines[1]);
}

#[test(tokio::test)]
async fn stream_ignores_other_topics() {
    let (block, next) = (root(0x10), root(0x11));
    let provider = MockProvider::new(0)
        .with_block("head", capella(20))
        .with_block(root_block_id(&block), capella(21))
        .with_block(root_block_id(&next), capella(22))
        .with_events(vec![
            Ok(EventKind::Block(SseBlock {
                slot: 21,
                block,
                execution_optimistic: false,
            })),
            Ok(EventKind::FinalizedCheckpoint(SseFinalizedCheckpoint {
                block,
                state: root(0x20),
                epoch: 0,
                execution_optimistic: false,
            })),
            head(22, next),
        ]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;

    let (provider, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 1 });
    assert_eq!(
        provider.block_requests(),
        ["head".to_string(), root_block_id(&next)]
    );
    assert!(!out.contains("Slot: 21\n"));
    assert!(out.contains("Slot: 22\n"));
}

#[test(tokio::test)]
async fn streamed_deneb_blocks_fetch_sidecars_by_root() {
    let r = root(0xde);
    let mut provider = MockProvider::new(0)
        .with_block("head", capella(30))
        .with_block(root_block_id(&r), DenebSignedBeaconBlock::default())
        .with_events(vec![head(31, r)]);
    provider
        .sidecars
        .insert(root_block_id(&r), vec![BlobSidecar::default()]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;

    let (provider, result, out) = run(provider, &req).await;
    assert_eq!(result.unwrap(), Outcome::Rendered { streamed: 1 });
    assert_eq!(provider.sidecar_requests(), [root_block_id(&r)]);
    assert!(out.contains("Blob sidecars: 1\n"));
}

/// Accepts the first block and then behaves like a closed pipe.
#[derive(Default)]
struct ClosedAfterFirstBlock {
    written: Vec<u8>,
    closed: bool,
}

impl Write for ClosedAfterFirstBlock {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[test(tokio::test)]
async fn stream_stops_when_output_is_closed() {
    let (a, b) = (root(0x0a), root(0x0b));
    let provider = MockProvider::new(0)
        .with_block("head", capella(40))
        .with_block(root_block_id(&a), capella(41))
        .with_block(root_block_id(&b), capella(42))
        .with_events(vec![head(41, a), head(42, b)]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;
    assert_eq!(req.on_event_error, EventErrorPolicy::LogAndContinue);

    let block_info = BlockInfo::new(provider);
    let mut out = ClosedAfterFirstBlock::default();
    let result = block_info.run(&req, &mut out, async {}).await;

    assert!(matches!(result, Err(BlockInfoError::Output(_))));
    assert!(String::from_utf8(out.written).unwrap().contains("Slot: 40\n"));
    assert_eq!(block_info.into_provider().block_requests().len(), 2);
}

#[test(tokio::test)]
async fn stream_aborts_on_failed_event() {
    let (missing, present) = (root(0x0f), root(0xf0));
    let provider = MockProvider::new(0)
        .with_block("head", capella(1))
        .with_block(root_block_id(&present), capella(3))
        .with_events(vec![head(2, missing), head(3, present)]);
    let mut req = request(Target::BlockId("head".into()));
    req.stream = true;
    req.on_event_error = EventErrorPolicy::Abort;

    let (provider, result, out) = run(provider, &req).await;
    assert!(matches!(result, Err(BlockInfoError::EmptyBlock)));
    assert_eq!(out.matches("Version: ").count(), 1);
    assert_eq!(provider.block_requests().len(), 2);
}

#[test(tokio::test)]
async fn configuration_failures_are_fatal() {
    let provider = MockProvider {
        fail_spec: true,
        ..MockProvider::new(0)
    };
    let (provider, result, _) = run(provider, &request(Target::BlockId("head".into()))).await;
    assert!(matches!(result, Err(BlockInfoError::Config(_))));
    assert!(provider.block_requests().is_empty());

    let mut provider = MockProvider::new(0);
    provider.spec.remove("SLOTS_PER_EPOCH");
    let (_, result, _) = run(provider, &request(Target::BlockId("head".into()))).await;
    assert!(matches!(
        result,
        Err(BlockInfoError::Timing(ConfigError::MissingField("SLOTS_PER_EPOCH")))
    ));
}

#[test]
fn target_requires_exactly_one_input() {
    assert_eq!(
        Target::from_options(Some("head".into()), None).unwrap(),
        Target::BlockId("head".into())
    );
    assert_eq!(
        Target::from_options(None, Some("1700000000".into())).unwrap(),
        Target::Time("1700000000".into())
    );
    assert!(matches!(
        Target::from_options(None, None),
        Err(BlockInfoError::Usage(_))
    ));
    assert!(matches!(
        Target::from_options(Some("head".into()), Some("0".into())),
        Err(BlockInfoError::Usage(_))
    ));
}
