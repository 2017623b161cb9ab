//! Core server: wires the managed process, broadcast buffer, and viewer
//! sessions together, and accepts incoming connections.

use crate::audit::AuditLog;
use crate::auth::{DenyAllResolver, SessionResolver, StaticResolver};
use crate::broadcast::ConsoleBuffer;
use crate::config::ServerConfig;
use crate::connection::{remote_label, ViewerHandle, ViewerRegistry};
use crate::handler::{ConsoleContext, ConsoleSession};
use crate::supervisor::ManagedProcess;
use crate::transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wcon_core::{WconError, WconResult};

/// The wcon server instance.
pub struct WconServer {
    config: ServerConfig,
    viewers: Arc<ViewerRegistry>,
    buffer: Arc<ConsoleBuffer>,
    ctx: Arc<ConsoleContext>,
    resolver: Arc<dyn SessionResolver>,
}

impl WconServer {
    /// Create a server instance: spawns the managed process and builds the
    /// per-session dependency context.
    pub fn new(config: ServerConfig) -> WconResult<Self> {
        let viewers = Arc::new(ViewerRegistry::new());
        let buffer = Arc::new(ConsoleBuffer::new(Arc::clone(&viewers)));

        let command = config
            .command
            .as_deref()
            .ok_or_else(|| WconError::Other("no managed process command configured".into()))?;
        let supervisor = Arc::new(ManagedProcess::spawn(
            command,
            Arc::clone(&buffer),
            config.history_limit,
        )?);

        let audit = Arc::new(AuditLog::new(config.audit_log_path.clone()));

        let resolver: Arc<dyn SessionResolver> = match &config.auth {
            Some(auth) => {
                info!(user = %auth.username, "static auth session configured");
                Arc::new(StaticResolver::new(&auth.username, &auth.permissions))
            }
            None => {
                warn!("no [auth] section configured — every command will be rejected");
                Arc::new(DenyAllResolver)
            }
        };

        let ctx = Arc::new(ConsoleContext { supervisor, audit });

        Ok(Self {
            config,
            viewers,
            buffer,
            ctx,
            resolver,
        })
    }

    /// Accept viewer connections until the listener closes.
    pub async fn run(self) -> WconResult<()> {
        let bind_addr: SocketAddr = format!("0.0.0.0:{}", self.config.port)
            .parse()
            .map_err(|e| WconError::Other(format!("invalid address: {e}")))?;

        let (local_addr, mut conn_rx) = transport::start_listener(bind_addr).await?;

        // The flush task lives exactly as long as the accept loop.
        let _flush_task = self.buffer.spawn_flush_task();

        info!(addr = %local_addr, "wcon-server ready");

        while let Some(conn) = conn_rx.recv().await {
            let remote = remote_label(conn.remote_addr);
            let session = self.resolver.resolve(&remote);
            let (viewer, outbound_rx) = ViewerHandle::new(remote, session);
            let viewer = Arc::new(viewer);
            let viewer_id = viewer.id;

            self.viewers.add(Arc::clone(&viewer)).await;
            debug!(viewers = self.viewers.count().await, "viewer registered");

            let ctx = Arc::clone(&self.ctx);
            let viewers = Arc::clone(&self.viewers);
            tokio::spawn(async move {
                ConsoleSession::new(ctx, viewer)
                    .run(conn.ws_stream, outbound_rx)
                    .await;
                viewers.remove(viewer_id).await;
            });
        }

        info!("listener closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_to_start_without_a_command() {
        let config = ServerConfig {
            port: 0,
            verbose: false,
            history_limit: 1024,
            audit_log_path: std::env::temp_dir().join("wcon-test-audit.log"),
            command: None,
            auth: None,
        };
        assert!(WconServer::new(config).is_err());
    }
}
