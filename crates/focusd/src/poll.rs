//! Remote command polling
//!
//! A GET against the configured endpoint at launch, again when the app asks
//! for a drain, and in the background while a push hint is outstanding.
//! Whatever comes back is handed to the engine's ingest path, which takes
//! care of de-duplication, so polling more than once is harmless.

use focus_api::RemoteCommandEnvelope;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Poll endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}

/// The endpoint may answer with a bare list or wrap it. Entries stay raw
/// JSON here so one bad entry cannot sink the rest of the batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PollBody {
    List(Vec<Value>),
    Wrapped { commands: Vec<Value> },
}

impl PollBody {
    fn into_commands(self) -> Vec<RemoteCommandEnvelope> {
        let entries = match self {
            PollBody::List(entries) | PollBody::Wrapped { commands: entries } => entries,
        };

        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                match serde_json::from_value::<RemoteCommandEnvelope>(entry) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping malformed polled command");
                        None
                    }
                }
            })
            .collect()
    }
}

pub struct RemotePoller {
    client: Client,
    url: String,
}

impl RemotePoller {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PollError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch pending commands once; no retries
    pub async fn fetch(&self) -> Result<Vec<RemoteCommandEnvelope>, PollError> {
        debug!(url = %self.url, "Polling for remote commands");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body: PollBody = response.json().await?;
        let commands = body.into_commands();
        info!(count = commands.len(), "Remote commands fetched");
        Ok(commands)
    }

    /// Like `fetch`, but a failure only costs this round
    pub async fn fetch_or_empty(&self) -> Vec<RemoteCommandEnvelope> {
        match self.fetch().await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Remote poll failed");
                Vec::new()
            }
        }
    }
}

/// Polling as the service loop sees it: inline fetches for explicit drains,
/// background fetches whose results come back through a channel
#[derive(Clone)]
pub struct RemoteSync {
    poller: Option<Arc<RemotePoller>>,
    fetched: mpsc::UnboundedSender<Vec<RemoteCommandEnvelope>>,
    in_flight: Arc<AtomicBool>,
}

impl RemoteSync {
    pub fn new(
        poller: Option<RemotePoller>,
        fetched: mpsc::UnboundedSender<Vec<RemoteCommandEnvelope>>,
    ) -> Self {
        Self {
            poller: poller.map(Arc::new),
            fetched,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn fetch_now(&self) -> Vec<RemoteCommandEnvelope> {
        match &self.poller {
            Some(poller) => poller.fetch_or_empty().await,
            None => Vec::new(),
        }
    }

    /// Start a background fetch unless one is already running. Returns
    /// whether a fetch was started.
    pub fn request_poll(&self) -> bool {
        let Some(poller) = self.poller.clone() else {
            return false;
        };
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Remote poll already in flight");
            return false;
        }

        let fetched = self.fetched.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let commands = poller.fetch_or_empty().await;
            in_flight.store(false, Ordering::Release);
            if fetched.send(commands).is_err() {
                debug!("Service loop gone, dropping fetched commands");
            }
        });
        true
    }
}
