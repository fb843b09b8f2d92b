//! Raydium log stream
//!
//! Subscribes to `logsSubscribe` with a `mentions` filter for each watched
//! program and forwards every notification into an mpsc channel. The
//! connection is re-established with exponential backoff whenever the
//! socket drops.

use std::time::Duration;

use futures::stream::{select_all, StreamExt};
use solana_client::{
    nonblocking::pubsub_client::PubsubClient,
    rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter},
    rpc_response::RpcLogsResponse,
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::ports::chain::{LogNotification, StreamEvent};

const RECONNECT_BASE_DELAY_MS: u64 = 1000;
const MAX_RECONNECT_DELAY_MS: u64 = 30000;

#[derive(Debug, Error)]
pub enum LogStreamError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("No programs to watch")]
    NoPrograms,

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Max reconnect attempts ({0}) exceeded")]
    ReconnectLimit(u32),
}

#[derive(Debug, Clone)]
pub struct LogStreamConfig {
    pub ws_url: String,
    pub program_ids: Vec<Pubkey>,
    pub commitment: CommitmentConfig,
    /// 0 = unlimited
    pub max_reconnect_attempts: u32,
    pub channel_buffer_size: usize,
}

impl LogStreamConfig {
    pub fn new(ws_url: impl Into<String>, program_ids: Vec<Pubkey>) -> Self {
        Self {
            ws_url: ws_url.into(),
            program_ids,
            commitment: CommitmentConfig::confirmed(),
            max_reconnect_attempts: 0,
            channel_buffer_size: 1000,
        }
    }
}

/// How a single connection ended
enum SessionEnd {
    Shutdown,
    Disconnected,
}

pub struct LogStream {
    config: LogStreamConfig,
    event_tx: mpsc::Sender<StreamEvent>,
}

impl LogStream {
    pub fn new(config: LogStreamConfig) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer_size);
        (Self { config, event_tx }, event_rx)
    }

    pub fn config(&self) -> &LogStreamConfig {
        &self.config
    }

    /// Stream until `shutdown` flips to true or the reconnect budget runs out
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), LogStreamError> {
        if self.config.program_ids.is_empty() {
            return Err(LogStreamError::NoPrograms);
        }
        info!(
            "Log stream starting: {} ({} programs)",
            self.config.ws_url,
            self.config.program_ids.len()
        );

        let mut attempts = 0u32;
        loop {
            match self.session(&mut shutdown, &mut attempts).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Log stream stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => warn!("Log stream disconnected"),
                Err(LogStreamError::ChannelClosed) => return Err(LogStreamError::ChannelClosed),
                Err(e) => {
                    error!("Log stream error: {}", e);
                    self.emit(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await?;
                }
            }

            if self.config.max_reconnect_attempts > 0
                && attempts >= self.config.max_reconnect_attempts
            {
                return Err(LogStreamError::ReconnectLimit(
                    self.config.max_reconnect_attempts,
                ));
            }
            attempts += 1;

            let delay = backoff_delay(attempts);
            warn!("Reconnecting in {}ms (attempt {})", delay.as_millis(), attempts);
            self.emit(StreamEvent::ConnectionState {
                connected: false,
                reconnect_count: attempts,
            })
            .await?;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        attempts: &mut u32,
    ) -> Result<SessionEnd, LogStreamError> {
        let client = PubsubClient::new(&self.config.ws_url)
            .await
            .map_err(|e| LogStreamError::ConnectionFailed(e.to_string()))?;

        let mut streams = Vec::with_capacity(self.config.program_ids.len());
        let mut unsubscribers = Vec::with_capacity(self.config.program_ids.len());
        for program in &self.config.program_ids {
            let (stream, unsubscribe) = client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![program.to_string()]),
                    RpcTransactionLogsConfig {
                        commitment: Some(self.config.commitment),
                    },
                )
                .await
                .map_err(|e| LogStreamError::SubscriptionFailed(e.to_string()))?;
            debug!("Subscribed to logs mentioning {}", program);
            streams.push(stream);
            unsubscribers.push(unsubscribe);
        }

        *attempts = 0;
        info!("Log stream connected");
        self.emit(StreamEvent::ConnectionState {
            connected: true,
            reconnect_count: 0,
        })
        .await?;

        let mut merged = select_all(streams);
        let end = loop {
            tokio::select! {
                next = merged.next() => match next {
                    Some(response) => {
                        self.emit(StreamEvent::Notification(to_notification(response.value)))
                            .await?;
                    }
                    None => break SessionEnd::Disconnected,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break SessionEnd::Shutdown;
                    }
                }
            }
        };

        drop(merged);
        for unsubscribe in unsubscribers {
            unsubscribe().await;
        }
        Ok(end)
    }

    async fn emit(&self, event: StreamEvent) -> Result<(), LogStreamError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| LogStreamError::ChannelClosed)
    }
}

pub fn to_notification(response: RpcLogsResponse) -> LogNotification {
    LogNotification {
        signature: response.signature,
        logs: response.logs,
        failed: response.err.is_some(),
    }
}

/// 2^attempt seconds, capped at 30s
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = RECONNECT_BASE_DELAY_MS.saturating_mul(2u64.pow(attempt.min(10)));
    Duration::from_millis(ms.min(MAX_RECONNECT_DELAY_MS))
}
