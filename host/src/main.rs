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

use std::{io, process::ExitCode, time::Duration};

use blockinfo::{BeaconClient, BlockInfo, Outcome, Request, Target};
use blockinfo_core::OutputMode;
use clap::Parser;
use tracing::{error, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Prints information about a beacon chain block
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Beacon API URL
    #[clap(long, env = "BEACON_RPC_URL")]
    beacon_api: Url,

    /// Block identifier: slot, block root, `head`, `finalized` or `genesis`
    #[clap(long = "blockid")]
    block_id: Option<String>,

    /// Block time as a hex or decimal unix timestamp, or a local
    /// `YYYY-MM-DDTHH:MM:SS` datetime
    #[clap(long)]
    time: Option<String>,

    /// Output the block as JSON
    #[clap(long)]
    json: bool,

    /// Output the block as hex-encoded SSZ
    #[clap(long)]
    ssz: bool,

    /// Keep printing new head blocks until interrupted
    #[clap(long)]
    stream: bool,

    /// Print nothing; exit with 0 if the block exists and 1 otherwise
    #[clap(long, short)]
    quiet: bool,

    /// Include per-item details in text output
    #[clap(long, short)]
    verbose: bool,

    /// Timeout for beacon API requests in seconds
    #[clap(long, default_value_t = 60)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(Outcome::Missing) => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<Outcome> {
    let target = Target::from_options(args.block_id, args.time)?;
    let mut request = Request::new(target);
    request.mode = OutputMode::from_flags(args.json, args.ssz);
    request.stream = args.stream;
    request.quiet = args.quiet;
    request.verbose = args.verbose;

    let client = BeaconClient::builder(args.beacon_api)?
        .with_timeout(Duration::from_secs(args.timeout))
        .build()?;
    let block_info = BlockInfo::new(client);

    let mut stdout = io::stdout().lock();
    let outcome = block_info.run(&request, &mut stdout, shutdown()).await?;
    Ok(outcome)
}

/// Completes on Ctrl-C.
async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
