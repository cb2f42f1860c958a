//! Console transport for local runs
//!
//! Stands in for a real messaging client: each stdin line becomes an inbound
//! event and replies are printed to stdout. `/quit` acts as an explicit
//! logout so the terminal-disconnect path can be exercised by hand.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use wr_core::InboundEvent;
use wr_session::{CloseReason, Result, Transport, TransportEvent};

const CONSOLE_PEER: &str = "console@local";

pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn connect(
        &self,
        credentials: Option<Vec<u8>>,
    ) -> Result<mpsc::Receiver<TransportEvent>> {
        debug!(paired = credentials.is_some(), "console transport connecting");
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            // A real client would stream credential deltas during the
            // handshake; emit one marker blob so reconnects resume paired.
            if credentials.is_none() {
                let _ = tx
                    .send(TransportEvent::CredentialsUpdated(
                        b"console-pairing".to_vec(),
                    ))
                    .await;
            }
            let _ = tx.send(TransportEvent::Opened).await;

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut next_id: u64 = 0;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim() == "/quit" => {
                        let _ = tx
                            .send(TransportEvent::Closed {
                                reason: CloseReason::LoggedOut,
                            })
                            .await;
                        return;
                    }
                    Ok(Some(line)) => {
                        next_id += 1;
                        let event =
                            InboundEvent::text(format!("CONSOLE-{next_id}"), CONSOLE_PEER, line);
                        if tx.send(TransportEvent::Inbound(event)).await.is_err() {
                            return;
                        }
                    }
                    // EOF or read error: treat as logout, a terminal won't
                    // come back.
                    _ => {
                        let _ = tx
                            .send(TransportEvent::Closed {
                                reason: CloseReason::LoggedOut,
                            })
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        println!("-> {recipient}: {text}");
        Ok(())
    }
}
