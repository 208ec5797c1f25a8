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

//! Human-readable block reports.
//!
//! Each fork's block is first reduced to a [BlockSummary], which is then
//! written by a single formatter. Sections that do not exist in a fork are
//! `None` and omitted from the report.

use crate::{Epoch, Fork, NetworkTiming, RenderError, Root, Slot, VersionedBlock};
use chrono::{Local, TimeZone};
use ethereum_consensus::{
    altair::SyncAggregate,
    capella::{SignedBlsToExecutionChange, Withdrawal},
    phase0::{
        Attestation, AttesterSlashing, Deposit, Eth1Data, ProposerSlashing, SignedVoluntaryExit,
    },
    primitives::{Gwei, ValidatorIndex},
};
use ssz_rs::HashTreeRoot;
use std::{collections::HashSet, fmt::Write};

const GWEI_PER_ETH: f64 = 1e9;

/// Renders the text report for `block`.
pub fn describe(
    block: &VersionedBlock,
    timing: &NetworkTiming,
    verbose: bool,
) -> Result<String, RenderError> {
    let summary = BlockSummary::try_from(block)?;
    let mut out = String::new();
    summary.write(&mut out, timing, verbose)?;
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttestationSummary {
    pub slot: Slot,
    pub committee_index: usize,
    pub beacon_block_root: Root,
    pub source_epoch: Epoch,
    pub target_epoch: Epoch,
    pub participants: usize,
    pub committee_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalSummary {
    pub index: u64,
    pub validator_index: ValidatorIndex,
    pub address: String,
    pub amount: Gwei,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPayloadSummary {
    pub block_number: u64,
    pub block_hash: String,
    pub parent_hash: String,
    pub fee_recipient: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: String,
    pub timestamp: u64,
    pub transactions: usize,
    pub withdrawals: Option<Vec<WithdrawalSummary>>,
    pub blob_gas: Option<(u64, u64)>,
}

/// Fork-independent view of a block used for the text report.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub version: Fork,
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub root: Root,
    pub parent_root: Root,
    pub state_root: Root,
    pub graffiti: String,
    pub eth1_deposit_count: u64,
    pub eth1_block_hash: String,
    pub attestations: Vec<AttestationSummary>,
    pub proposer_slashings: Vec<ValidatorIndex>,
    pub attester_slashings: Vec<ValidatorIndex>,
    pub deposits: Vec<Gwei>,
    pub voluntary_exits: Vec<(ValidatorIndex, Epoch)>,
    /// Participants and committee size.
    pub sync_aggregate: Option<(usize, usize)>,
    pub execution_payload: Option<ExecutionPayloadSummary>,
    pub bls_to_execution_changes: Option<Vec<(ValidatorIndex, String)>>,
    pub blob_kzg_commitments: Option<Vec<String>>,
    pub blob_sidecars: Option<Vec<u64>>,
}

// Fields shared by every fork's signed block and body.
macro_rules! summarize_common {
    ($version:expr, $signed:expr) => {{
        let message = &$signed.message;
        let body = &message.body;
        BlockSummary {
            version: $version,
            slot: message.slot,
            proposer_index: message.proposer_index,
            root: message.hash_tree_root()?,
            parent_root: message.parent_root,
            state_root: message.state_root,
            graffiti: graffiti(body.graffiti.as_ref()),
            eth1_deposit_count: eth1_deposit_count(&body.eth1_data),
            eth1_block_hash: to_hex(body.eth1_data.block_hash.as_ref()),
            attestations: attestations(&body.attestations),
            proposer_slashings: proposer_slashings(&body.proposer_slashings),
            attester_slashings: attester_slashings(&body.attester_slashings),
            deposits: deposits(&body.deposits),
            voluntary_exits: voluntary_exits(&body.voluntary_exits),
            sync_aggregate: None,
            execution_payload: None,
            bls_to_execution_changes: None,
            blob_kzg_commitments: None,
            blob_sidecars: None,
        }
    }};
}

macro_rules! summarize_payload {
    ($payload:expr) => {{
        let payload = &$payload;
        ExecutionPayloadSummary {
            block_number: payload.block_number,
            block_hash: to_hex(payload.block_hash.as_ref()),
            parent_hash: to_hex(payload.parent_hash.as_ref()),
            fee_recipient: to_hex(payload.fee_recipient.as_ref()),
            gas_used: payload.gas_used,
            gas_limit: payload.gas_limit,
            base_fee_per_gas: payload.base_fee_per_gas.to_string(),
            timestamp: payload.timestamp,
            transactions: payload.transactions.len(),
            withdrawals: None,
            blob_gas: None,
        }
    }};
}

impl TryFrom<&VersionedBlock> for BlockSummary {
    type Error = RenderError;

    fn try_from(block: &VersionedBlock) -> Result<Self, Self::Error> {
        let summary = match block {
            VersionedBlock::Phase0(b) => summarize_common!(Fork::Phase0, b),
            VersionedBlock::Altair(b) => BlockSummary {
                sync_aggregate: Some(sync_participation(&b.message.body.sync_aggregate)),
                ..summarize_common!(Fork::Altair, b)
            },
            VersionedBlock::Bellatrix(b) => {
                let body = &b.message.body;
                BlockSummary {
                    sync_aggregate: Some(sync_participation(&body.sync_aggregate)),
                    execution_payload: Some(summarize_payload!(body.execution_payload)),
                    ..summarize_common!(Fork::Bellatrix, b)
                }
            }
            VersionedBlock::Capella(b) => {
                let body = &b.message.body;
                BlockSummary {
                    sync_aggregate: Some(sync_participation(&body.sync_aggregate)),
                    execution_payload: Some(ExecutionPayloadSummary {
                        withdrawals: Some(withdrawals(&body.execution_payload.withdrawals)),
                        ..summarize_payload!(body.execution_payload)
                    }),
                    bls_to_execution_changes: Some(bls_changes(&body.bls_to_execution_changes)),
                    ..summarize_common!(Fork::Capella, b)
                }
            }
            VersionedBlock::Deneb {
                block: b,
                blob_sidecars,
            } => {
                let body = &b.message.body;
                let payload = &body.execution_payload;
                BlockSummary {
                    sync_aggregate: Some(sync_participation(&body.sync_aggregate)),
                    execution_payload: Some(ExecutionPayloadSummary {
                        withdrawals: Some(withdrawals(&payload.withdrawals)),
                        blob_gas: Some((payload.blob_gas_used, payload.excess_blob_gas)),
                        ..summarize_payload!(payload)
                    }),
                    bls_to_execution_changes: Some(bls_changes(&body.bls_to_execution_changes)),
                    blob_kzg_commitments: Some(
                        body.blob_kzg_commitments
                            .iter()
                            .map(|c| to_hex(c.as_ref()))
                            .collect(),
                    ),
                    blob_sidecars: Some(blob_sidecars.iter().map(|s| s.index as u64).collect()),
                    ..summarize_common!(Fork::Deneb, b)
                }
            }
        };
        Ok(summary)
    }
}

impl BlockSummary {
    /// Writes the report. Verbose mode adds per-operation detail.
    pub fn write(
        &self,
        out: &mut impl Write,
        timing: &NetworkTiming,
        verbose: bool,
    ) -> std::fmt::Result {
        let slot_start = timing.slot_start(self.slot);
        writeln!(out, "Version: {}", self.version)?;
        writeln!(out, "Slot: {}", self.slot)?;
        writeln!(out, "Epoch: {}", timing.epoch_at_slot(self.slot))?;
        writeln!(out, "Timestamp: {} ({})", format_time(slot_start), slot_start)?;
        writeln!(out, "Block root: {}", self.root)?;
        writeln!(out, "Parent root: {}", self.parent_root)?;
        writeln!(out, "State root: {}", self.state_root)?;
        writeln!(out, "Proposer index: {}", self.proposer_index)?;
        if !self.graffiti.is_empty() {
            writeln!(out, "Graffiti: {}", self.graffiti)?;
        }
        if verbose {
            writeln!(out, "Ethereum 1 deposit count: {}", self.eth1_deposit_count)?;
            writeln!(out, "Ethereum 1 block hash: {}", self.eth1_block_hash)?;
        }

        writeln!(out, "Attestations: {}", self.attestations.len())?;
        if verbose {
            for (i, att) in self.attestations.iter().enumerate() {
                writeln!(out, "  {i}:")?;
                writeln!(out, "    Slot: {}", att.slot)?;
                writeln!(out, "    Committee index: {}", att.committee_index)?;
                writeln!(
                    out,
                    "    Attesters: {}/{}",
                    att.participants, att.committee_size
                )?;
                writeln!(out, "    Beacon block root: {}", att.beacon_block_root)?;
                writeln!(out, "    Source epoch: {}", att.source_epoch)?;
                writeln!(out, "    Target epoch: {}", att.target_epoch)?;
            }
        }

        writeln!(out, "Attester slashings: {}", self.attester_slashings.len())?;
        if verbose && !self.attester_slashings.is_empty() {
            writeln!(out, "  Slashed validators: {}", join(&self.attester_slashings))?;
        }
        writeln!(out, "Proposer slashings: {}", self.proposer_slashings.len())?;
        if verbose && !self.proposer_slashings.is_empty() {
            writeln!(out, "  Slashed validators: {}", join(&self.proposer_slashings))?;
        }

        writeln!(out, "Deposits: {}", self.deposits.len())?;
        if verbose {
            for amount in &self.deposits {
                writeln!(out, "  {:.9} ETH", *amount as f64 / GWEI_PER_ETH)?;
            }
        }
        writeln!(out, "Voluntary exits: {}", self.voluntary_exits.len())?;
        if verbose {
            for (validator_index, epoch) in &self.voluntary_exits {
                writeln!(out, "  Validator {validator_index} at epoch {epoch}")?;
            }
        }

        if let Some((participants, size)) = self.sync_aggregate {
            let pct = if size == 0 {
                0.0
            } else {
                participants as f64 * 100.0 / size as f64
            };
            writeln!(
                out,
                "Sync committee participation: {participants}/{size} ({pct:.2}%)"
            )?;
        }

        if let Some(payload) = &self.execution_payload {
            writeln!(out, "Execution block number: {}", payload.block_number)?;
            writeln!(out, "Execution block hash: {}", payload.block_hash)?;
            if verbose {
                writeln!(out, "Execution parent hash: {}", payload.parent_hash)?;
                writeln!(out, "Execution timestamp: {}", payload.timestamp)?;
            }
            writeln!(out, "Fee recipient: {}", payload.fee_recipient)?;
            writeln!(
                out,
                "Gas used: {}/{}",
                payload.gas_used, payload.gas_limit
            )?;
            writeln!(out, "Base fee per gas: {}", payload.base_fee_per_gas)?;
            writeln!(out, "Transactions: {}", payload.transactions)?;
            if let Some((used, excess)) = payload.blob_gas {
                writeln!(out, "Blob gas used: {used}")?;
                writeln!(out, "Excess blob gas: {excess}")?;
            }
            if let Some(withdrawals) = &payload.withdrawals {
                writeln!(out, "Withdrawals: {}", withdrawals.len())?;
                if verbose {
                    for w in withdrawals {
                        writeln!(
                            out,
                            "  {}: validator {} to {} ({:.9} ETH)",
                            w.index,
                            w.validator_index,
                            w.address,
                            w.amount as f64 / GWEI_PER_ETH
                        )?;
                    }
                }
            }
        }

        if let Some(changes) = &self.bls_to_execution_changes {
            writeln!(out, "BLS to execution changes: {}", changes.len())?;
            if verbose {
                for (validator_index, address) in changes {
                    writeln!(out, "  Validator {validator_index} to {address}")?;
                }
            }
        }

        if let Some(commitments) = &self.blob_kzg_commitments {
            writeln!(out, "Blob KZG commitments: {}", commitments.len())?;
            if verbose {
                for commitment in commitments {
                    writeln!(out, "  {commitment}")?;
                }
            }
        }
        if let Some(sidecars) = &self.blob_sidecars {
            writeln!(out, "Blob sidecars: {}", sidecars.len())?;
            if verbose && !sidecars.is_empty() {
                writeln!(out, "  Indices: {}", join(sidecars))?;
            }
        }

        Ok(())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S %z").to_string(),
        None => "unknown".to_string(),
    }
}

fn graffiti(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn eth1_deposit_count(eth1_data: &Eth1Data) -> u64 {
    eth1_data.deposit_count
}

fn attestations<const N: usize>(attestations: &[Attestation<N>]) -> Vec<AttestationSummary> {
    attestations
        .iter()
        .map(|att| AttestationSummary {
            slot: att.data.slot,
            committee_index: att.data.index,
            beacon_block_root: att.data.beacon_block_root,
            source_epoch: att.data.source.epoch,
            target_epoch: att.data.target.epoch,
            participants: att.aggregation_bits.count_ones(),
            committee_size: att.aggregation_bits.len(),
        })
        .collect()
}

fn proposer_slashings(slashings: &[ProposerSlashing]) -> Vec<ValidatorIndex> {
    slashings
        .iter()
        .map(|s| s.signed_header_1.message.proposer_index)
        .collect()
}

/// Validators slashed by the given slashings: those attesting in both
/// conflicting attestations.
fn attester_slashings<const N: usize>(slashings: &[AttesterSlashing<N>]) -> Vec<ValidatorIndex> {
    let mut slashed = Vec::new();
    for slashing in slashings {
        let second: HashSet<_> = slashing.attestation_2.attesting_indices.iter().collect();
        slashed.extend(
            slashing
                .attestation_1
                .attesting_indices
                .iter()
                .filter(|i| second.contains(i))
                .copied(),
        );
    }
    slashed.sort_unstable();
    slashed.dedup();
    slashed
}

fn deposits(deposits: &[Deposit]) -> Vec<Gwei> {
    deposits.iter().map(|d| d.data.amount).collect()
}

fn voluntary_exits(exits: &[SignedVoluntaryExit]) -> Vec<(ValidatorIndex, Epoch)> {
    exits
        .iter()
        .map(|e| (e.message.validator_index, e.message.epoch))
        .collect()
}

fn sync_participation<const N: usize>(aggregate: &SyncAggregate<N>) -> (usize, usize) {
    (
        aggregate.sync_committee_bits.count_ones(),
        aggregate.sync_committee_bits.len(),
    )
}

fn withdrawals(withdrawals: &[Withdrawal]) -> Vec<WithdrawalSummary> {
    withdrawals
        .iter()
        .map(|w| WithdrawalSummary {
            index: w.index as u64,
            validator_index: w.validator_index,
            address: to_hex(w.address.as_ref()),
            amount: w.amount,
        })
        .collect()
}

fn bls_changes(changes: &[SignedBlsToExecutionChange]) -> Vec<(ValidatorIndex, String)> {
    changes
        .iter()
        .map(|c| {
            (
                c.message.validator_index,
                to_hex(c.message.to_execution_address.as_ref()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mainnet::{
        AltairSignedBeaconBlock, BlobSidecar, CapellaSignedBeaconBlock, DenebSignedBeaconBlock,
        Phase0SignedBeaconBlock,
    };
    use std::time::Duration;

    fn timing() -> NetworkTiming {
        NetworkTiming::new(1606824023, Duration::from_secs(12), 32).unwrap()
    }

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn phase0_report_has_header_and_operations() {
        let mut block = Phase0SignedBeaconBlock::default();
        block.message.slot = 100;
        block.message.proposer_index = 42;
        let text = describe(&block.into(), &timing(), false).unwrap();
        let lines = lines(&text);

        assert!(lines[0].starts_with("Version: "));
        assert!(lines.contains(&"Slot: 100"));
        assert!(lines.contains(&"Epoch: 3"));
        assert!(lines.contains(&"Proposer index: 42"));
        assert!(lines.contains(&"Attestations: 0"));
        assert!(lines.contains(&"Voluntary exits: 0"));
        assert!(text.contains(&format!("({})", 1606824023 + 1200)));
        // no post-phase0 sections
        assert!(!text.contains("Sync committee"));
        assert!(!text.contains("Execution block"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn altair_reports_sync_participation() {
        let block = AltairSignedBeaconBlock::default();
        let text = describe(&block.into(), &timing(), false).unwrap();
        assert!(text.contains("Sync committee participation: 0/512 (0.00%)"));
    }

    #[test]
    fn capella_reports_payload_and_withdrawals() {
        let mut block = CapellaSignedBeaconBlock::default();
        block.message.body.execution_payload.block_number = 17034870;
        block.message.body.execution_payload.gas_used = 15;
        block.message.body.execution_payload.gas_limit = 30;
        let text = describe(&block.into(), &timing(), true).unwrap();

        assert!(text.contains("Execution block number: 17034870"));
        assert!(text.contains("Gas used: 15/30"));
        assert!(text.contains("Withdrawals: 0"));
        assert!(text.contains("BLS to execution changes: 0"));
        assert!(!text.contains("Blob"));
    }

    #[test]
    fn deneb_reports_blob_sidecars() {
        let mut second = BlobSidecar::default();
        second.index = 1;
        let block = VersionedBlock::from(DenebSignedBeaconBlock::default())
            .with_blob_sidecars(vec![BlobSidecar::default(), second]);

        let text = describe(&block, &timing(), true).unwrap();
        assert!(text.contains("Blob KZG commitments: 0"));
        assert!(text.contains("Blob sidecars: 2"));
        assert!(text.contains("  Indices: 0, 1"));
        assert!(text.contains("Blob gas used: 0"));
    }

    #[test]
    fn block_root_matches_message_root() {
        let mut block = AltairSignedBeaconBlock::default();
        block.message.slot = 9;
        let root = block.message.hash_tree_root().unwrap();
        let summary = BlockSummary::try_from(&VersionedBlock::from(block)).unwrap();
        assert_eq!(summary.root, root);
    }

    #[test]
    fn graffiti_is_trimmed() {
        let mut raw = [0u8; 32];
        raw[..5].copy_from_slice(b"hello");
        assert_eq!(graffiti(&raw), "hello");
        assert_eq!(graffiti(&[0u8; 32]), "");
    }
}
