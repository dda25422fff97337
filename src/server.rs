//! # Gain Server
//!
//! Accept loop that hands each connection to a [`ConnectionHandler`] task.
//!
//! ## Admission Control:
//! A semaphore permit is acquired *before* each `accept`, so at most
//! `max_connections` connections are handled at once. Further clients wait in
//! the listen backlog until a running connection finishes and its permit is
//! released.
//!
//! ## Shutdown:
//! When the shutdown future resolves the loop stops accepting. Connections
//! already in flight keep running to completion on their own tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::GainProcessor;
use crate::config::AppConfig;
use crate::connection::ConnectionHandler;
use crate::error::{StreamError, StreamResult};
use crate::state::ServerState;

/// Pause after a failed `accept` (e.g. out of file descriptors) before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct GainServer {
    processor: GainProcessor,
    state: ServerState,
    limiter: Arc<Semaphore>,
    max_connections: usize,
}

impl GainServer {
    pub fn new(processor: GainProcessor, max_connections: usize) -> Self {
        Self {
            processor,
            state: ServerState::new(),
            limiter: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Build a server from validated configuration.
    pub fn from_config(config: &AppConfig) -> StreamResult<Self> {
        config.validate()?;
        let processor = GainProcessor::new(config.processing.gain_db)?;
        Ok(Self::new(processor, config.server.max_concurrent_connections))
    }

    pub fn state(&self) -> ServerState {
        self.state.clone()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub async fn bind(addr: impl ToSocketAddrs) -> StreamResult<TcpListener> {
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> StreamResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            addr = ?listener.local_addr().ok(),
            gain_db = self.processor.gain_db(),
            max_connections = self.max_connections,
            "Server listening"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.limiter.clone().acquire_owned() => permit
                    .map_err(|err| StreamError::Internal(format!("connection limiter closed: {}", err)))?,
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "Accept error");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                },
            };

            let handler = ConnectionHandler::new(Uuid::new_v4(), self.processor, self.state.clone());
            tokio::spawn(async move {
                handler.serve_stream(stream, peer).await;
                drop(permit);
            });
        }

        let snapshot = self.state.snapshot();
        info!(
            accepted = snapshot.connections_accepted,
            active = snapshot.active_connections,
            completed = snapshot.connections_completed,
            failed = snapshot.connections_failed,
            chunks = snapshot.chunks_processed,
            bytes = snapshot.bytes_processed,
            "Server stopped accepting connections"
        );
        Ok(())
    }
}
