//! Realtime event channel over a long-lived SSE connection.
//!
//! State machine: Disconnected → Connecting → Connected → Disconnected,
//! with exponential-backoff reconnection (1s doubling to 16s, five attempts)
//! after any failure. A non-2xx response on connect is treated exactly like
//! a mid-stream transport error. `disconnect` cancels any in-flight request
//! and any pending backoff timer and suppresses automatic reconnection;
//! `reconnect` resets the attempt counter and tries again immediately.
//!
//! The channel authenticates once per connection with a bearer token. It
//! never refreshes credentials itself: a caller holding a rotated credential
//! calls `reconnect` explicitly.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use petsafe_core::{EventHandler, Notifier};
use petsafe_domain::{
    ChannelState, ConnectionStatus, PetSafeError, RealtimeEvent, MAX_RECONNECT_ATTEMPTS,
    RECONNECT_BASE_DELAY,
};
use reqwest::header::ACCEPT;
use reqwest::Response;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::parser::{SseFrame, SseParser};
use crate::api::CredentialProvider;

/// Configuration for the realtime event channel.
#[derive(Debug, Clone)]
pub struct EventChannelConfig {
    /// Base URL of the backend (e.g., "https://api.petsafe.app/v1").
    pub base_url: String,
    /// Path of the event feed relative to the base URL.
    pub events_path: String,
    /// Automatic reconnect attempts before the terminal error.
    pub max_reconnect_attempts: u32,
    /// Base backoff delay, doubled per attempt.
    pub reconnect_base_delay: Duration,
    /// Timeout for establishing the connection. Reads are unbounded by
    /// design: liveness comes from the reconnect state machine, not a read
    /// timeout.
    pub connect_timeout: Duration,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.petsafe.app/v1".to_string(),
            events_path: "/events".to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct ChannelContext {
    http: reqwest::Client,
    config: EventChannelConfig,
    credentials: Arc<dyn CredentialProvider>,
    handlers: Vec<Arc<dyn EventHandler>>,
    notifier: Arc<dyn Notifier>,
    status_tx: watch::Sender<ConnectionStatus>,
}

/// Long-lived SSE client with explicit lifecycle management.
pub struct EventChannel {
    ctx: Arc<ChannelContext>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl EventChannel {
    /// Create a channel. Handlers are registered up front; the channel is
    /// constructed once at process start and shared by reference.
    ///
    /// # Errors
    ///
    /// Returns a config error when the HTTP client cannot be built.
    pub fn new(
        config: EventChannelConfig,
        credentials: Arc<dyn CredentialProvider>,
        handlers: Vec<Arc<dyn EventHandler>>,
        notifier: Arc<dyn Notifier>,
    ) -> std::result::Result<Self, PetSafeError> {
        // No total timeout: the response body is an endless stream.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| PetSafeError::Config(format!("failed to build HTTP client: {e}")))?;

        let (status_tx, _) = watch::channel(ConnectionStatus::default());

        let ctx =
            Arc::new(ChannelContext { http, config, credentials, handlers, notifier, status_tx });

        Ok(Self { ctx, cancellation: CancellationToken::new(), task_handle: None })
    }

    /// Watch receiver for connection status updates.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.ctx.status_tx.subscribe()
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.ctx.status_tx.borrow().clone()
    }

    /// Open the stream and keep it alive until `disconnect` or the
    /// reconnect budget is exhausted.
    #[instrument(skip(self))]
    pub fn connect(&mut self) -> std::result::Result<(), PetSafeError> {
        if self.is_running() {
            return Err(PetSafeError::InvalidInput("channel already connected".into()));
        }

        info!("starting realtime channel");
        self.cancellation = CancellationToken::new();

        let ctx = Arc::clone(&self.ctx);
        let cancel = self.cancellation.clone();
        self.task_handle = Some(tokio::spawn(async move {
            Self::run_loop(ctx, cancel).await;
        }));

        Ok(())
    }

    /// Tear the connection down and suppress automatic reconnection.
    /// Idempotent: disconnecting a disconnected channel is a no-op that
    /// still leaves the published state at Disconnected.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("realtime channel task did not stop within timeout");
            }
        }

        self.ctx.publish(|s| {
            s.state = ChannelState::Disconnected;
        });
        info!("realtime channel disconnected");
    }

    /// Manual retry: resets the attempt counter and connects immediately.
    /// Also the path for picking up a rotated credential.
    #[instrument(skip(self))]
    pub async fn reconnect(&mut self) -> std::result::Result<(), PetSafeError> {
        self.disconnect().await;
        self.ctx.publish(|s| {
            s.reconnect_attempts = 0;
            s.last_error = None;
        });
        self.connect()
    }

    /// Returns true while the connection task is alive.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn run_loop(ctx: Arc<ChannelContext>, cancel: CancellationToken) {
        let mut attempts: u32 = 0;

        loop {
            ctx.publish(|s| s.state = ChannelState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = ctx.open_stream() => result,
            };

            match connected {
                Ok(response) => {
                    info!("event stream connected");
                    attempts = 0;
                    ctx.publish(|s| {
                        s.state = ChannelState::Connected;
                        s.reconnect_attempts = 0;
                        s.last_error = None;
                    });

                    let reason = ctx.read_stream(response, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    warn!(reason = %reason, "event stream dropped");
                    ctx.publish(|s| {
                        s.state = ChannelState::Disconnected;
                        s.last_error = Some(reason);
                    });
                }
                Err(reason) => {
                    warn!(reason = %reason, "event stream connection failed");
                    ctx.publish(|s| {
                        s.state = ChannelState::Disconnected;
                        s.last_error = Some(reason);
                    });
                }
            }

            attempts += 1;
            if attempts > ctx.config.max_reconnect_attempts {
                warn!(
                    attempts = attempts - 1,
                    "reconnect attempts exhausted, giving up until manual reconnect"
                );
                ctx.publish(|s| {
                    s.last_error = Some("reconnect attempts exhausted".to_string());
                });
                break;
            }

            let delay = reconnect_delay(ctx.config.reconnect_base_delay, attempts);
            debug!(attempt = attempts, ?delay, "scheduling reconnect");
            ctx.publish(|s| s.reconnect_attempts = attempts);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("realtime channel loop ended");
    }
}

/// Backoff before reconnect attempt `attempt` (1-based): base doubled per
/// attempt, shift capped to keep the multiplication safe.
fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(8);
    base.saturating_mul(1 << shift)
}

impl ChannelContext {
    fn publish<F: FnOnce(&mut ConnectionStatus)>(&self, update: F) {
        self.status_tx.send_modify(update);
    }

    async fn open_stream(&self) -> std::result::Result<Response, String> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(|e| format!("credential unavailable: {e}"))?;

        let url = format!("{}{}", self.config.base_url, self.config.events_path);
        debug!(url = %url, "opening event stream");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| format!("connection failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.credentials.invalidate().await;
            }
            return Err(format!("event stream returned {status}"));
        }

        Ok(response)
    }

    /// Pump the byte stream through the parser until it ends, errors, or
    /// the channel is cancelled. Returns the human-readable drop reason.
    async fn read_stream(&self, response: Response, cancel: &CancellationToken) -> String {
        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return "cancelled".to_string(),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    for frame in parser.push(&text) {
                        self.dispatch(frame).await;
                    }
                }
                Some(Err(e)) => return format!("stream error: {e}"),
                None => return "stream ended".to_string(),
            }
        }
    }

    /// Decode and fan out one parsed frame. Decode failure drops the event
    /// without touching the connection; in-order delivery to every handler.
    async fn dispatch(&self, frame: SseFrame) {
        let event = match RealtimeEvent::decode(&frame.name, &frame.data) {
            Ok(event) => event,
            Err(err) => {
                warn!(event = %frame.name, error = %err, "dropping undecodable event");
                return;
            }
        };

        debug!(event = event.name(), "dispatching realtime event");
        self.publish(|s| s.last_event = Some(event.name().to_string()));

        for handler in &self.handlers {
            handler.handle_event(&event).await;
        }

        if let Some((title, body)) = event.notification() {
            self.notifier.notify(&title, &body).await;
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("EventChannel dropped while connected; cancelling");
            self.cancellation.cancel();
        }
    }
}
