//! Session lifecycle management
//!
//! Owns exactly one logical connection to the messaging transport: connect,
//! authenticate with the persisted credential blob, surface inbound events,
//! and reconnect after a fixed delay unless the disconnect was an explicit
//! logout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use wr_core::InboundEvent;

use crate::credentials::CredentialStore;
use crate::error::{Result, SessionError};
use crate::transport::{Transport, TransportEvent};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticated,
    /// Terminal: explicit logout, no further reconnect attempts
    Closing,
}

/// Typed stream emitted to the admission layer and logging collaborators
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionOpened,
    ConnectionClosed { terminal: bool },
    Inbound(InboundEvent),
}

/// What a single connection ended with
enum ConnectionOutcome {
    /// Logout: the session is over
    Terminal,
    /// Recoverable close or stream end: schedule a retry
    Dropped,
}

/// Manages one auto-reconnecting session over a [`Transport`]
pub struct SessionManager<T: Transport> {
    transport: Arc<T>,
    credentials: CredentialStore,
    retry_delay: Duration,
    state_tx: watch::Sender<SessionState>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: Arc<T>, credentials: CredentialStore, retry_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            credentials,
            retry_delay,
            state_tx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Request termination. A pending reconnect timer observes this and
    /// no-ops instead of reconnecting.
    pub fn shutdown(&self) {
        self.set_state(SessionState::Closing);
    }

    /// Send an outbound message through the live connection
    pub async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        self.transport.send(recipient, text).await
    }

    /// Drive the session until logout. Recoverable failures reconnect after
    /// the fixed delay; only an explicit logout (or a shutdown request) ends
    /// the loop.
    pub async fn run(&self, events: mpsc::Sender<SessionEvent>) -> Result<()> {
        loop {
            if self.state() == SessionState::Closing {
                break;
            }

            self.set_state(SessionState::Connecting);

            // Always handshake with the latest persisted credentials.
            let creds = match self.credentials.load() {
                Ok(creds) => creds,
                Err(e) => {
                    warn!("failed to read credentials, connecting unauthenticated: {e}");
                    None
                }
            };

            match self.transport.connect(creds).await {
                Ok(mut connection) => match self.pump(&mut connection, &events).await? {
                    ConnectionOutcome::Terminal => {
                        info!("logged out, session closed");
                        self.set_state(SessionState::Closing);
                        return Ok(());
                    }
                    ConnectionOutcome::Dropped => {
                        self.set_state(SessionState::Disconnected);
                    }
                },
                Err(e) => {
                    error!("handshake failed: {e}");
                    self.set_state(SessionState::Disconnected);
                }
            }

            info!("reconnecting in {:?}", self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;

            // A logout may have arrived while the timer was pending.
            if self.state() == SessionState::Closing {
                info!("shutdown requested, cancelling reconnect");
                break;
            }
        }

        Ok(())
    }

    /// Consume one connection's event stream until it closes
    async fn pump(
        &self,
        connection: &mut mpsc::Receiver<TransportEvent>,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Result<ConnectionOutcome> {
        loop {
            match connection.recv().await {
                Some(TransportEvent::Opened) => {
                    info!("connection authenticated");
                    self.set_state(SessionState::Authenticated);
                    self.emit(events, SessionEvent::ConnectionOpened).await?;
                }
                Some(TransportEvent::CredentialsUpdated(blob)) => {
                    // Non-fatal: a failed write must not take the session down.
                    if let Err(e) = self.credentials.save(&blob) {
                        error!("failed to persist credentials: {e}");
                    }
                }
                Some(TransportEvent::Inbound(event)) => {
                    self.emit(events, SessionEvent::Inbound(event)).await?;
                }
                Some(TransportEvent::Closed { reason }) => {
                    let terminal = reason.is_terminal();
                    warn!(?reason, terminal, "connection closed");
                    self.emit(events, SessionEvent::ConnectionClosed { terminal })
                        .await?;
                    return Ok(if terminal {
                        ConnectionOutcome::Terminal
                    } else {
                        ConnectionOutcome::Dropped
                    });
                }
                None => {
                    warn!("transport stream ended without a close signal");
                    self.emit(events, SessionEvent::ConnectionClosed { terminal: false })
                        .await?;
                    return Ok(ConnectionOutcome::Dropped);
                }
            }
        }
    }

    async fn emit(&self, events: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> Result<()> {
        events
            .send(event)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            // Closing is terminal: once a logout was requested or observed,
            // no later transition may revive the session.
            if *current == state
                || (*current == SessionState::Closing && state != SessionState::Closing)
            {
                return false;
            }
            info!(previous = ?*current, ?state, "session state changed");
            *current = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CloseReason;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Transport that replays a fixed script of connections
    struct ScriptedTransport {
        connects: AtomicUsize,
        last_credentials: Mutex<Option<Vec<u8>>>,
        script: Mutex<VecDeque<Vec<TransportEvent>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Vec<TransportEvent>>) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                last_credentials: Mutex::new(None),
                script: Mutex::new(script.into()),
            })
        }

        fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &self,
            credentials: Option<Vec<u8>>,
        ) -> Result<mpsc::Receiver<TransportEvent>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            *self.last_credentials.lock().unwrap() = credentials;

            let events = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SessionError::Transport("no connection scripted".to_string()))?;

            let (tx, rx) = mpsc::channel(16);
            for event in events {
                tx.send(event).await.expect("scripted channel");
            }
            Ok(rx)
        }

        async fn send(&self, _recipient: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn manager_for(
        transport: Arc<ScriptedTransport>,
        retry_delay_ms: u64,
    ) -> (SessionManager<ScriptedTransport>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let credentials = CredentialStore::new(dir.path().join("creds.bin"));
        let manager = SessionManager::new(
            transport,
            credentials,
            Duration::from_millis(retry_delay_ms),
        );
        (manager, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_is_terminal() {
        let transport = ScriptedTransport::new(vec![vec![
            TransportEvent::Opened,
            TransportEvent::Closed {
                reason: CloseReason::LoggedOut,
            },
        ]]);
        let (manager, _dir) = manager_for(transport.clone(), 5000);
        let (tx, mut rx) = mpsc::channel(16);

        manager.run(tx).await.unwrap();

        assert_eq!(manager.state(), SessionState::Closing);
        assert_eq!(transport.connect_count(), 1);

        assert!(matches!(rx.recv().await, Some(SessionEvent::ConnectionOpened)));
        assert!(matches!(
            rx.recv().await,
            Some(SessionEvent::ConnectionClosed { terminal: true })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_fixed_delay() {
        let transport = ScriptedTransport::new(vec![
            vec![
                TransportEvent::Opened,
                TransportEvent::Closed {
                    reason: CloseReason::Error("stream errored".to_string()),
                },
            ],
            vec![
                TransportEvent::Opened,
                TransportEvent::Closed {
                    reason: CloseReason::LoggedOut,
                },
            ],
        ]);
        let (manager, _dir) = manager_for(transport.clone(), 5000);
        let manager = Arc::new(manager);

        let (tx, mut rx) = mpsc::channel(16);
        let runner = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(tx).await })
        };

        // First connection drops; the retry must not fire before the delay.
        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(transport.connect_count(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.connect_count(), 2);

        runner.await.unwrap().unwrap();
        assert_eq!(manager.state(), SessionState::Closing);

        // Drain: open, non-terminal close, open, terminal close.
        let mut closes = Vec::new();
        while let Some(event) = rx.recv().await {
            if let SessionEvent::ConnectionClosed { terminal } = event {
                closes.push(terminal);
            }
        }
        assert_eq!(closes, vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_retry() {
        let transport = ScriptedTransport::new(vec![vec![TransportEvent::Closed {
            reason: CloseReason::Error("server restart".to_string()),
        }]]);
        let (manager, _dir) = manager_for(transport.clone(), 5000);
        let manager = Arc::new(manager);

        let (tx, _rx) = mpsc::channel(16);
        let runner = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(tx).await })
        };

        // Let the first connection drop and the retry timer start.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.connect_count(), 1);

        // Logout arrives while the timer is pending.
        manager.shutdown();

        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert_eq!(transport.connect_count(), 1);

        runner.await.unwrap().unwrap();
        assert_eq!(manager.state(), SessionState::Closing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_persisted_and_reused() {
        let transport = ScriptedTransport::new(vec![
            vec![
                TransportEvent::CredentialsUpdated(b"paired-keys".to_vec()),
                TransportEvent::Opened,
                TransportEvent::Closed {
                    reason: CloseReason::Error("drop".to_string()),
                },
            ],
            vec![
                TransportEvent::Opened,
                TransportEvent::Closed {
                    reason: CloseReason::LoggedOut,
                },
            ],
        ]);
        let (manager, _dir) = manager_for(transport.clone(), 100);
        let (tx, mut rx) = mpsc::channel(16);

        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        manager.run(tx).await.unwrap();
        drain.await.unwrap();

        // The reconnect handshake read back the blob written by the first
        // connection.
        assert_eq!(
            transport.last_credentials.lock().unwrap().as_deref(),
            Some(b"paired-keys".as_slice())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_events_forwarded_in_order() {
        let transport = ScriptedTransport::new(vec![vec![
            TransportEvent::Opened,
            TransportEvent::Inbound(InboundEvent::text("A", "peer", "first")),
            TransportEvent::Inbound(InboundEvent::text("B", "peer", "second")),
            TransportEvent::Closed {
                reason: CloseReason::LoggedOut,
            },
        ]]);
        let (manager, _dir) = manager_for(transport, 5000);
        let (tx, mut rx) = mpsc::channel(16);

        manager.run(tx).await.unwrap();

        let mut inbound_ids = Vec::new();
        while let Some(event) = rx.recv().await {
            if let SessionEvent::Inbound(e) = event {
                inbound_ids.push(e.id);
            }
        }
        assert_eq!(inbound_ids, vec!["A".to_string(), "B".to_string()]);
    }
}
