// Copyright 2024 RISC Zero, Inc.
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

use blockinfo_core::{DecodeError, Epoch, Root, Slot, VersionedBlock, mainnet::BlobSidecar};
use ethereum_consensus::serde::as_str;
use futures::{Stream, StreamExt};
use reqwest::{IntoUrl, StatusCode};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Errors returned by the [BeaconClient].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not parse URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("event stream failed: {0}")]
    Events(String),
}

/// Wrapper returned by the API calls.
#[derive(Serialize, Deserialize)]
struct Response<T> {
    data: T,
    #[serde(flatten)]
    meta: HashMap<String, serde_json::Value>,
}

/// Wrapper returned by the API calls that includes a version.
///
/// The version is kept as a string so that forks this client does not know
/// about are reported as such rather than as a malformed response.
#[derive(Serialize, Deserialize)]
struct VersionedResponse<T> {
    version: String,
    #[serde(flatten)]
    inner: Response<T>,
}

#[derive(Debug, Deserialize)]
struct GenesisData {
    #[serde(with = "as_str")]
    genesis_time: u64,
}

/// Simple beacon API client for the `mainnet` preset that can query blocks and subscribe to events.
#[derive(Clone)]
pub struct BeaconClient {
    http: reqwest::Client,
    endpoint: Url,
}

/// Builder for a [BeaconClient].
pub struct BeaconClientBuilder {
    endpoint: Url,
    timeout: Option<Duration>,
}

impl BeaconClientBuilder {
    /// Sets a timeout for every (non-streaming) request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<BeaconClient, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(BeaconClient {
            http: builder.build()?,
            endpoint: self.endpoint,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    Head,
    Block,
    FinalizedCheckpoint,
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTopic::Head => write!(f, "head"),
            EventTopic::Block => write!(f, "block"),
            EventTopic::FinalizedCheckpoint => write!(f, "finalized_checkpoint"),
        }
    }
}

#[derive(PartialEq, Debug, Serialize, Clone)]
pub enum EventKind {
    Head(SseHead),
    Block(SseBlock),
    FinalizedCheckpoint(SseFinalizedCheckpoint),
}

impl EventKind {
    pub fn topic(&self) -> EventTopic {
        match self {
            EventKind::Head(_) => EventTopic::Head,
            EventKind::Block(_) => EventTopic::Block,
            EventKind::FinalizedCheckpoint(_) => EventTopic::FinalizedCheckpoint,
        }
    }

    pub fn from_sse_bytes(event: &str, data: &str) -> Result<Self, String> {
        match event {
            "block" => Ok(EventKind::Block(
                serde_json::from_str(data).map_err(|e| format!("Block: {:?}", e))?,
            )),
            "finalized_checkpoint" => Ok(EventKind::FinalizedCheckpoint(
                serde_json::from_str(data).map_err(|e| format!("Finalized Checkpoint: {:?}", e))?,
            )),
            "head" => Ok(EventKind::Head(
                serde_json::from_str(data).map_err(|e| format!("Head: {:?}", e))?,
            )),
            _ => Err(format!("Could not parse event tag {event}")),
        }
    }
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct SseFinalizedCheckpoint {
    pub block: Root,
    pub state: Root,
    #[serde(with = "as_str")]
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct SseHead {
    #[serde(with = "as_str")]
    pub slot: Slot,
    pub block: Root,
    pub state: Root,
    pub epoch_transition: bool,
    #[serde(default)]
    pub execution_optimistic: bool,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct SseBlock {
    #[serde(with = "as_str")]
    pub slot: Slot,
    pub block: Root,
    pub execution_optimistic: bool,
}

impl BeaconClient {
    /// Creates a new beacon endpoint API client.
    pub fn new<U: IntoUrl>(endpoint: U) -> Result<Self, Error> {
        Self::builder(endpoint)?.build()
    }

    pub fn builder<U: IntoUrl>(endpoint: U) -> Result<BeaconClientBuilder, Error> {
        Ok(BeaconClientBuilder {
            endpoint: endpoint.into_url()?,
            timeout: None,
        })
    }

    async fn http_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let target = self.endpoint.join(path)?;
        let resp = self.http.get(target).send().await?;
        let value = resp.error_for_status()?.json().await?;
        Ok(value)
    }

    /// Like `http_get`, but maps a `404 Not Found` to `None`.
    async fn http_get_opt<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, Error> {
        let target = self.endpoint.join(path)?;
        let resp = self.http.get(target).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("{path} not found");
            return Ok(None);
        }
        let value = resp.error_for_status()?.json().await?;
        Ok(Some(value))
    }

    /// Retrieves the chain configuration of the node.
    #[tracing::instrument(skip(self))]
    pub async fn get_spec(&self) -> Result<HashMap<String, serde_json::Value>, Error> {
        let result: Response<HashMap<String, serde_json::Value>> =
            self.http_get("eth/v1/config/spec").await?;
        Ok(result.data)
    }

    /// Retrieves the genesis time of the chain as unix seconds.
    #[tracing::instrument(skip(self))]
    pub async fn get_genesis_time(&self) -> Result<u64, Error> {
        let result: Response<GenesisData> = self.http_get("eth/v1/beacon/genesis").await?;
        Ok(result.data.genesis_time)
    }

    /// Retrieves the signed block for given block id, or `None` if the node has no such block.
    #[tracing::instrument(skip(self), fields(block_id = %block_id))]
    pub async fn get_block(
        &self,
        block_id: impl Display,
    ) -> Result<Option<VersionedBlock>, Error> {
        let path = format!("eth/v2/beacon/blocks/{block_id}");
        let Some(result) = self
            .http_get_opt::<VersionedResponse<serde_json::Value>>(&path)
            .await?
        else {
            return Ok(None);
        };
        let block = VersionedBlock::from_api(&result.version, result.inner.data)?;
        Ok(Some(block))
    }

    /// Retrieves the blob sidecars for given block id.
    #[tracing::instrument(skip(self), fields(block_id = %block_id))]
    pub async fn get_blob_sidecars(&self, block_id: impl Display) -> Result<Vec<BlobSidecar>, Error> {
        let path = format!("eth/v1/beacon/blob_sidecars/{block_id}");
        let result: Option<Response<Vec<BlobSidecar>>> = self.http_get_opt(&path).await?;
        Ok(result.map(|r| r.data).unwrap_or_default())
    }

    /// `GET events?topics`
    pub async fn get_events(
        &self,
        topic: &[EventTopic],
    ) -> Result<impl Stream<Item = Result<EventKind, Error>> + use<>, Error> {
        let topic_string = topic
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("eth/v1/events?topics={}", topic_string.as_str());

        info!("Get Events: {path}");

        let mut es = EventSource::get(self.endpoint.join(&path)?);
        // If we don't await `Event::Open` here, then the consumer
        // will not get any Message events until they start awaiting the stream.
        // This is a way to register the stream with the sse server before
        // message events start getting emitted.
        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => break,
                Err(err) => return Err(Error::Events(format!("{:?}", err))),
                // This should never happen as we are guaranteed to get the
                // Open event before any message starts coming through.
                Ok(Event::Message(_)) => continue,
            }
        }
        Ok(Box::pin(es.filter_map(|event| async move {
            match event {
                Ok(Event::Open) => None,
                Ok(Event::Message(message)) => Some(
                    EventKind::from_sse_bytes(&message.event, &message.data).map_err(Error::Events),
                ),
                Err(err) => Some(Err(Error::Events(format!("{:?}", err)))),
            }
        })))
    }
}
