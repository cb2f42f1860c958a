//! Dispatch loop: session events → admission → responder → outbound send
//!
//! Only admitted events reach the responder. Responder failures turn into a
//! fixed apology to the sender; logging failures are reported and otherwise
//! ignored. Nothing here may crash the session loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use wr_core::{AdmissionFilter, ConversationLog, Decision, InboundEvent, Responder};
use wr_session::{SessionEvent, SessionManager, Transport};

/// Fallback sent when the responder fails for an admitted event
pub const APOLOGY: &str = "Sorry, there was an error processing your message.";

/// Wires the admission filter, the responder and the conversation log onto
/// the session's event stream. Replies go back out through the session
/// manager.
pub struct Dispatcher<T: Transport, R: Responder> {
    session: Arc<SessionManager<T>>,
    filter: Arc<AdmissionFilter>,
    responder: Arc<R>,
    store: Option<Arc<dyn ConversationLog>>,
}

impl<T: Transport, R: Responder> Dispatcher<T, R> {
    pub fn new(
        session: Arc<SessionManager<T>>,
        filter: Arc<AdmissionFilter>,
        responder: Arc<R>,
        store: Option<Arc<dyn ConversationLog>>,
    ) -> Self {
        Self {
            session,
            filter,
            responder,
            store,
        }
    }

    /// Consume session events until the stream ends
    pub async fn run(&self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::ConnectionOpened => {
                    info!("connected, ready for messages");
                }
                SessionEvent::ConnectionClosed { terminal } => {
                    if terminal {
                        info!("session logged out");
                    } else {
                        warn!("connection lost, session manager will reconnect");
                    }
                }
                SessionEvent::Inbound(inbound) => self.handle_inbound(inbound).await,
            }
        }
        debug!("session event stream ended");
    }

    async fn handle_inbound(&self, event: InboundEvent) {
        match self.filter.evaluate(&event) {
            Decision::Reject(reason) => {
                debug!(id = %event.id, ?reason, "event dropped");
            }
            Decision::Admit => match self.responder.respond(&event).await {
                Ok(reply) => {
                    self.log_exchange(&event, &reply);
                    self.deliver(&event.sender_id, &reply).await;
                }
                Err(e) => {
                    error!(id = %event.id, "responder failed: {e}");
                    self.deliver(&event.sender_id, APOLOGY).await;
                }
            },
        }
    }

    /// Fire-and-forget append to the conversation log
    fn log_exchange(&self, event: &InboundEvent, reply: &str) {
        let Some(store) = &self.store else { return };
        let message = event.text_content().unwrap_or_default();
        if let Err(e) = store.append(&event.sender_id, message, reply) {
            error!("failed to log conversation: {e}");
        }
    }

    async fn deliver(&self, recipient: &str, text: &str) {
        if let Err(e) = self.session.send(recipient, text).await {
            error!(recipient, "failed to send reply: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;
    use wr_core::{AdmissionConfig, ConversationStore, Error};
    use wr_session::{CredentialStore, SessionError, TransportEvent};

    /// Transport that records outbound sends
    struct CollectingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl CollectingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for CollectingTransport {
        async fn connect(
            &self,
            _credentials: Option<Vec<u8>>,
        ) -> wr_session::Result<mpsc::Receiver<TransportEvent>> {
            Err(SessionError::Transport("not used in dispatch tests".to_string()))
        }

        async fn send(&self, recipient: &str, text: &str) -> wr_session::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// Responder that always fails
    struct BrokenResponder;

    #[async_trait::async_trait]
    impl Responder for BrokenResponder {
        async fn respond(&self, _event: &InboundEvent) -> wr_core::Result<String> {
            Err(Error::Responder("model unavailable".to_string()))
        }
    }

    /// Conversation log whose writes always fail
    struct BrokenLog;

    impl ConversationLog for BrokenLog {
        fn append(
            &self,
            _sender_id: &str,
            _message: &str,
            _response: &str,
        ) -> wr_core::Result<()> {
            Err(Error::Other("log store unavailable".to_string()))
        }
    }

    fn filter() -> Arc<AdmissionFilter> {
        Arc::new(AdmissionFilter::new(AdmissionConfig {
            window: Duration::from_secs(5),
            max_attempts: 2,
            max_records: 1000,
            self_id: None,
        }))
    }

    fn session_for(
        transport: Arc<CollectingTransport>,
    ) -> (Arc<SessionManager<CollectingTransport>>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let credentials = CredentialStore::new(dir.path().join("creds.bin"));
        let session = Arc::new(SessionManager::new(
            transport,
            credentials,
            Duration::from_millis(100),
        ));
        (session, dir)
    }

    async fn run_events(
        dispatcher: Dispatcher<CollectingTransport, impl Responder>,
        events: Vec<SessionEvent>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        dispatcher.run(rx).await;
    }

    #[tokio::test]
    async fn test_admitted_event_is_answered_and_logged() {
        let transport = CollectingTransport::new();
        let (session, _dir) = session_for(transport.clone());
        let store = Arc::new(ConversationStore::in_memory().unwrap());
        let log: Arc<dyn ConversationLog> = store.clone();
        let dispatcher = Dispatcher::new(
            session,
            filter(),
            Arc::new(wr_core::AutoResponder::new()),
            Some(log),
        );

        run_events(
            dispatcher,
            vec![
                SessionEvent::ConnectionOpened,
                SessionEvent::Inbound(InboundEvent::text("A", "peer@s.whatsapp.net", "hola")),
            ],
        )
        .await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "peer@s.whatsapp.net");
        assert_eq!(sent[0].1, "Hello! How can I help you?");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_beyond_ceiling_get_no_reply() {
        let transport = CollectingTransport::new();
        let (session, _dir) = session_for(transport.clone());
        let dispatcher = Dispatcher::new(
            session,
            filter(),
            Arc::new(wr_core::AutoResponder::new()),
            None,
        );

        let event = InboundEvent::text("DUP", "peer@s.whatsapp.net", "hola");
        run_events(
            dispatcher,
            vec![
                SessionEvent::Inbound(event.clone()),
                SessionEvent::Inbound(event.clone()),
                SessionEvent::Inbound(event),
            ],
        )
        .await;

        // Ceiling is 2: the third redelivery is dropped silently.
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_responder_failure_sends_apology() {
        let transport = CollectingTransport::new();
        let (session, _dir) = session_for(transport.clone());
        let store = Arc::new(ConversationStore::in_memory().unwrap());
        let log: Arc<dyn ConversationLog> = store.clone();
        let dispatcher = Dispatcher::new(session, filter(), Arc::new(BrokenResponder), Some(log));

        run_events(
            dispatcher,
            vec![SessionEvent::Inbound(InboundEvent::text(
                "B",
                "peer@s.whatsapp.net",
                "hola",
            ))],
        )
        .await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, APOLOGY);
        // Failed exchanges are not logged.
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_log_failure_does_not_block_delivery() {
        let transport = CollectingTransport::new();
        let (session, _dir) = session_for(transport.clone());
        let dispatcher = Dispatcher::new(
            session,
            filter(),
            Arc::new(wr_core::AutoResponder::new()),
            Some(Arc::new(BrokenLog)),
        );

        run_events(
            dispatcher,
            vec![SessionEvent::Inbound(InboundEvent::text(
                "L",
                "peer@s.whatsapp.net",
                "hola",
            ))],
        )
        .await;

        // The write failed, the reply still went out.
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Hello! How can I help you?");
    }

    #[tokio::test]
    async fn test_rejected_events_send_nothing() {
        let transport = CollectingTransport::new();
        let (session, _dir) = session_for(transport.clone());
        let dispatcher = Dispatcher::new(
            session,
            filter(),
            Arc::new(wr_core::AutoResponder::new()),
            None,
        );

        run_events(
            dispatcher,
            vec![
                SessionEvent::Inbound(InboundEvent::text("C1", wr_core::BROADCAST_ID, "status")),
                SessionEvent::Inbound(InboundEvent::text("C2", "peer@s.whatsapp.net", "   ")),
            ],
        )
        .await;

        assert!(transport.sent().is_empty());
    }
}
