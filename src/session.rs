//! The session actor: one `tokio::spawn`ed task per session, exclusively owning that session's
//! history, client set, PTY handle, and logger. All outside access goes through `SessionHandle`,
//! whose methods only ever post a message into the actor's bounded mailbox — this recreates the
//! single-writer discipline cooperative single-threading gets for free, without any locks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::PtyError;
use crate::logger::SessionLogger;
use crate::protocol::ServerMessage;
use crate::pty::PtyProcess;

const MAILBOX_CAPACITY: usize = 256;
const CLIENT_OUTBOX_CAPACITY: usize = 1024;

/// Messages the session actor's mailbox accepts.
pub enum SessionMessage {
    Attach {
        sender: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ClientId>,
    },
    Detach(ClientId),
    ClientInput(Vec<u8>),
    Resize { cols: u16, rows: u16 },
    PtyOutput(Vec<u8>),
    PtyExit,
    Close,
    Stats(oneshot::Sender<SessionStats>),
}

/// What a session actor sends toward one attached client; the WebSocket handler task translates
/// these into actual `axum::extract::ws::Message`s.
pub enum OutboundMessage {
    Binary(Arc<[u8]>),
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub id: String,
    pub created: DateTime<Utc>,
    pub clients: usize,
    pub alive: bool,
}

/// Cheap, cloneable handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
    tx: mpsc::Sender<SessionMessage>,
}

impl SessionHandle {
    /// Spawn a fresh session: fork the PTY, conditionally start logging, and launch the actor
    /// task. Returns immediately; PTY output starts arriving asynchronously.
    pub fn start(
        id: String,
        cols: u16,
        rows: u16,
        cmd: &str,
        settings: &Settings,
    ) -> Result<Self, PtyError> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let created_at = Utc::now();

        let pty = PtyProcess::spawn(cols, rows, cmd, settings, id.clone(), tx.clone())?;

        let logger = if settings.log_enabled {
            let mut logger = SessionLogger::new(&settings.log_dir, &id);
            match logger.start() {
                Ok(()) => Some(logger),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "failed to start session logging, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let actor = Actor {
            id: id.clone(),
            created_at,
            history: Vec::new(),
            history_size: settings.history_size,
            clients: HashMap::new(),
            next_client_id: 0,
            pty: Some(pty),
            logger,
            alive: true,
            closing: false,
        };

        tokio::spawn(actor.run(rx));

        Ok(Self { id, created_at, tx })
    }

    pub async fn attach(&self) -> Option<(ClientId, mpsc::UnboundedReceiver<OutboundMessage>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Attach {
                sender,
                reply: reply_tx,
            })
            .await
            .ok()?;
        let id = reply_rx.await.ok()?;
        Some((id, receiver))
    }

    pub async fn detach(&self, client: ClientId) {
        let _ = self.tx.send(SessionMessage::Detach(client)).await;
    }

    pub async fn write(&self, data: Vec<u8>) {
        let _ = self.tx.send(SessionMessage::ClientInput(data)).await;
    }

    pub async fn resize(&self, cols: u16, rows: u16) {
        let _ = self.tx.send(SessionMessage::Resize { cols, rows }).await;
    }

    pub async fn stats(&self) -> Option<SessionStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(SessionMessage::Stats(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Idempotent; tolerated even if the actor has already exited its loop.
    pub async fn close(&self) {
        let _ = self.tx.send(SessionMessage::Close).await;
    }
}

struct Actor {
    id: String,
    created_at: DateTime<Utc>,
    history: Vec<u8>,
    history_size: usize,
    clients: HashMap<u64, mpsc::UnboundedSender<OutboundMessage>>,
    next_client_id: u64,
    pty: Option<PtyProcess>,
    logger: Option<SessionLogger>,
    alive: bool,
    closing: bool,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionMessage>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                SessionMessage::Attach { sender, reply } => self.handle_attach(sender, reply),
                SessionMessage::Detach(id) => self.handle_detach(id),
                SessionMessage::ClientInput(data) => self.handle_client_input(&data),
                SessionMessage::Resize { cols, rows } => self.handle_resize(cols, rows),
                SessionMessage::PtyOutput(data) => self.handle_pty_output(data),
                SessionMessage::PtyExit => self.handle_pty_exit(),
                SessionMessage::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                SessionMessage::Close => {
                    self.handle_close();
                    break;
                }
            }
        }
        debug!(session_id = %self.id, "session actor loop exited");
    }

    fn handle_attach(&mut self, sender: mpsc::UnboundedSender<OutboundMessage>, reply: oneshot::Sender<ClientId>) {
        let id = self.next_client_id;
        self.next_client_id += 1;

        // Send the current history as a single binary frame, best-effort.
        let _ = sender.send(OutboundMessage::Binary(Arc::from(self.history.as_slice())));

        self.clients.insert(id, sender);
        debug!(session_id = %self.id, client_id = id, total = self.clients.len(), "client attached");
        let _ = reply.send(ClientId(id));
    }

    fn handle_detach(&mut self, client: ClientId) {
        self.clients.remove(&client.0);
        debug!(session_id = %self.id, client_id = client.0, total = self.clients.len(), "client detached");
    }

    fn handle_client_input(&mut self, data: &[u8]) {
        if let Some(pty) = &self.pty {
            pty.write(data);
        }
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) {
        if let Some(pty) = &self.pty {
            pty.resize(cols, rows);
        }
    }

    fn handle_pty_output(&mut self, data: Vec<u8>) {
        self.history.extend_from_slice(&data);
        if self.history.len() > self.history_size {
            let overflow = self.history.len() - self.history_size;
            self.history.drain(0..overflow);
        }

        if let Some(logger) = &mut self.logger {
            logger.write(&data);
        }

        let chunk: Arc<[u8]> = Arc::from(data.as_slice());
        let mut dead = Vec::new();
        for (&id, sender) in self.clients.iter() {
            if sender.send(OutboundMessage::Binary(chunk.clone())).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.clients.remove(&id);
        }
    }

    fn handle_pty_exit(&mut self) {
        self.alive = false;
        info!(session_id = %self.id, "pty exited, notifying clients");
        let exit = serde_json::to_string(&ServerMessage::Exit).expect("exit message always serializes");
        let mut dead = Vec::new();
        for (&id, sender) in self.clients.iter() {
            if sender.send(OutboundMessage::Text(exit.clone())).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.clients.remove(&id);
        }
    }

    fn handle_close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;

        if let Some(pty) = self.pty.take() {
            pty.close();
        }
        self.alive = false;
        if let Some(mut logger) = self.logger.take() {
            logger.stop();
        }
        for (_, sender) in self.clients.drain() {
            let _ = sender.send(OutboundMessage::Close);
        }
        info!(session_id = %self.id, "session closed");
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id.clone(),
            created: self.created_at,
            clients: self.clients.len(),
            alive: self.alive,
        }
    }
}
