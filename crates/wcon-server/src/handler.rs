//! Per-connection console session: lifecycle, history replay, and command
//! authorization.

use crate::audit::AuditLog;
use crate::auth::{authorize, scopes};
use crate::connection::ViewerHandle;
use crate::supervisor::ProcessSupervisor;
use crate::transport::WsStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use wcon_core::{decode_event, encode_event, sanitize, WireEvent};

/// Dependencies injected into every console session.
pub struct ConsoleContext {
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub audit: Arc<AuditLog>,
}

/// What an inbound command resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Session invalid: logout emitted, session cleared, connection must close.
    LoggedOut,
    /// Authenticated but missing the write scope: denial sent, connection stays.
    Denied,
    /// Forwarded to the supervisor and recorded in the audit log.
    Executed,
}

/// One viewer's session, driven by its own task.
pub struct ConsoleSession {
    ctx: Arc<ConsoleContext>,
    viewer: Arc<ViewerHandle>,
}

impl ConsoleSession {
    pub fn new(ctx: Arc<ConsoleContext>, viewer: Arc<ViewerHandle>) -> Self {
        Self { ctx, viewer }
    }

    /// Drive the connection until it closes: replay history, then pump
    /// outbound events and inbound frames.
    pub async fn run(self, mut ws: WsStream, mut outbound_rx: mpsc::Receiver<WireEvent>) {
        let username = self.viewer.username().await;
        info!(user = %username, remote = %self.viewer.remote, "viewer connected");

        self.replay_history();

        loop {
            tokio::select! {
                Some(event) = outbound_rx.recv() => {
                    if !send_event(&mut ws, &event).await {
                        break;
                    }
                }

                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match decode_event(text.as_str()) {
                                Ok(WireEvent::ConsoleCommand(command)) => {
                                    if self.handle_command(&command).await == CommandOutcome::LoggedOut {
                                        // Deliver the queued logout before closing.
                                        while let Ok(event) = outbound_rx.try_recv() {
                                            send_event(&mut ws, &event).await;
                                        }
                                        let _ = ws.close(None).await;
                                        break;
                                    }
                                }
                                Ok(other) => {
                                    debug!(?other, "ignoring unexpected inbound event");
                                }
                                Err(e) => {
                                    debug!(error = %e, "ignoring malformed inbound frame");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(reason))) => {
                            debug!(remote = %self.viewer.remote, ?reason, "viewer disconnected");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary and pong frames carry nothing for us.
                        }
                        Some(Err(e)) => {
                            debug!(remote = %self.viewer.remote, error = %e, "socket error");
                            break;
                        }
                        None => {
                            debug!(remote = %self.viewer.remote, "viewer connection ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Queue the supervisor's full history (sanitized) for this viewer only.
    /// Failure leaves the connection usable, just without context.
    fn replay_history(&self) {
        match self.ctx.supervisor.history() {
            Ok(history) if !history.is_empty() => {
                if !self.viewer.send(WireEvent::ConsoleData(sanitize(&history))) {
                    debug!(remote = %self.viewer.remote, "could not queue history replay");
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "error sending old buffer");
            }
        }
    }

    /// Authorize and route one inbound command.
    pub async fn handle_command(&self, command: &str) -> CommandOutcome {
        let auth = authorize(self.viewer.session.as_ref(), scopes::CONSOLE_WRITE).await;

        if !auth.valid_auth {
            self.viewer.send(WireEvent::Logout);
            if let Some(session) = &self.viewer.session {
                session.write().await.clear();
            }
            debug!(remote = %self.viewer.remote, "unauthenticated command, forcing logout");
            return CommandOutcome::LoggedOut;
        }

        let username = self.viewer.username().await;

        if !auth.valid_perm {
            let notice = format!("Permission '{}' denied.", scopes::CONSOLE_WRITE);
            debug!(remote = %self.viewer.remote, user = %username, %notice);
            self.viewer
                .send(WireEvent::ConsoleData(sanitize(&format!(
                    "\n<mark>{notice}</mark>\n"
                ))));
            return CommandOutcome::Denied;
        }

        info!(command = %command, user = %username, "executing console command");
        self.ctx.supervisor.submit_command(command);
        self.ctx
            .audit
            .append(&AuditLog::format_line(&self.viewer.remote, &username, command))
            .await;
        CommandOutcome::Executed
    }
}

/// Write one event to the socket. Returns false when the write fails; the
/// payload is dropped and the caller tears the session down.
async fn send_event(ws: &mut WsStream, event: &WireEvent) -> bool {
    let text = match encode_event(event) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "failed to encode outbound event");
            return true;
        }
    };
    match ws.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "message not sent");
            false
        }
    }
}
