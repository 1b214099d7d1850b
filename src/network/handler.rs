//! Main network handler

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::Result;

use super::connection_pool::ConnectionPool;
use super::SHUTDOWN_TIMEOUT_MS;

/// Accepts connections and serves them through the application
pub struct NetworkHandler {
    app: Arc<App>,
    connection_pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
}

impl NetworkHandler {
    /// Create a new network handler
    #[must_use]
    pub fn new(app: Arc<App>) -> Self {
        let max_connections = app.config().limits.max_connections;
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            app,
            connection_pool: ConnectionPool::new(max_connections),
            shutdown_tx,
        }
    }

    /// Handle used to trigger a graceful shutdown
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the configured address and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or cannot be bound
    pub async fn run(self) -> Result<()> {
        let addr = self.app.config().listen_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be read
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Listening on {}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Some(guard) = self.connection_pool.try_acquire() else {
                                warn!("Connection limit reached, rejecting {}", peer_addr);
                                drop(stream);
                                continue;
                            };

                            let app = Arc::clone(&self.app);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            connections.spawn(async move {
                                let _guard = guard;
                                serve_connection(stream, peer_addr, app, shutdown_rx).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        warn!("Connection task failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Initiating graceful shutdown");
        self.shutdown_tx.send(()).ok();
        self.app.capture().shutdown();

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = connections.join_next().await {
                if let Err(e) = result {
                    warn!("Task cleanup error: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} connections after timeout", connections.len());
            connections.abort_all();
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Connections currently being served
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.connection_pool.active_connections()
    }
}

/// Serve one HTTP/1.1 connection until it closes or shutdown is requested
async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    app: Arc<App>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("Accepted connection from {}", peer_addr);

    let service = service_fn(move |request: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(app.handle(request).await) }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown_rx.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!("Connection from {} ended with error: {}", peer_addr, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LimitsConfig};

    fn test_app() -> Arc<App> {
        let mut config = Config::default();
        config.server.listen_addr = "127.0.0.1:0".to_string();
        config.limits = LimitsConfig {
            max_connections: 10,
            ..Default::default()
        };
        Arc::new(App::new(config))
    }

    #[test]
    fn test_network_handler_creation() {
        let handler = NetworkHandler::new(test_app());

        assert_eq!(handler.connection_pool.max_connections(), 10);
        assert_eq!(handler.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let app = test_app();
        let handler = NetworkHandler::new(Arc::clone(&app));
        let shutdown = handler.shutdown_handle();

        let handle = tokio::spawn(async move { handler.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).ok();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok());
        assert!(app.capture().subscribe().is_none());
    }
}
