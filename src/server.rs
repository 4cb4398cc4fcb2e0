use std::{
    net::{Shutdown, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::watch,
    task::{JoinError, JoinSet},
};
use tracing::Instrument;

use crate::{connection, systems::Lottery};

// how long to wait before accepting again after the listener failed
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Every connection that is currently being served
///
/// a second handle to each socket is kept here so the connections
/// can be closed from outside their handlers
#[derive(Debug, Default)]
struct Connections {
    next_id: AtomicU64,
    streams: DashMap<u64, std::net::TcpStream>,
}

impl Connections {
    fn register(self: &Arc<Self>, stream: std::net::TcpStream) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.insert(id, stream);

        Registration {
            id,
            connections: self.clone(),
        }
    }

    fn close_all(&self) -> usize {
        let mut closed = 0;
        for stream in self.streams.iter() {
            // the handler notices on its next read or write
            if stream.value().shutdown(Shutdown::Both).is_ok() {
                closed += 1;
            }
        }

        closed
    }
}

// Unregisters the connection once its handler is done with it
struct Registration {
    id: u64,
    connections: Arc<Connections>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.connections.streams.remove(&self.id);
    }
}

/// Stops a running server from any task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<watch::Sender<bool>>,
    connections: Arc<Connections>,
}

impl ShutdownHandle {
    /// Stops accepting new connections and closes the open ones.
    ///
    /// Calling it more than once is harmless.
    pub fn shutdown(&self) {
        let already_stopped = self.running.send_replace(true);
        if already_stopped {
            return;
        }

        let closed = self.connections.close_all();
        tracing::info!(action = "shutdown", result = "in_progress", closed);
    }
}

pub struct Server {
    listener: TcpListener,
    lottery: Arc<Lottery>,
    running: Arc<watch::Sender<bool>>,
    connections: Arc<Connections>,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, lottery: Arc<Lottery>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            action = "listen",
            result = "success",
            address = %listener.local_addr()?
        );

        let (running, _) = watch::channel(false);
        Ok(Self {
            listener,
            lottery,
            running: Arc::new(running),
            connections: Arc::default(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.running.clone(),
            connections: self.connections.clone(),
        }
    }

    /// Serves connections until a shutdown is requested,
    /// then waits for every handler to finish
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            listener,
            lottery,
            running,
            connections,
        } = self;

        let mut stop = running.subscribe();
        let mut handlers = JoinSet::new();

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = stop.changed() => continue,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let (stream, registration) = match register(stream, &connections) {
                            Ok(registered) => registered,
                            Err(err) => {
                                tracing::warn!(action = "accept", result = "fail", %peer, error = %err);
                                continue;
                            }
                        };

                        // a shutdown might have raced with this accept
                        if *running.borrow() {
                            connections.close_all();
                        }

                        tracing::debug!(action = "accept", result = "success", %peer);
                        let lottery = lottery.clone();
                        handlers.spawn(
                            async move {
                                let _registration = registration;
                                if let Err(err) = connection::handle(stream, lottery).await {
                                    tracing::warn!(action = "handle_connection", result = "fail", error = %err);
                                }
                            }
                            .instrument(tracing::info_span!("connection", %peer)),
                        );
                    }
                    Err(err) => {
                        tracing::warn!(action = "accept", result = "fail", error = %err);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = handlers.join_next() => report(finished),
            }
        }

        drop(listener);
        while let Some(finished) = handlers.join_next().await {
            report(finished);
        }

        tracing::info!(action = "shutdown", result = "success");
        Ok(())
    }
}

// Splits the accepted stream in the handle given to the handler
// and the one kept in the registry
fn register(
    stream: TcpStream,
    connections: &Arc<Connections>,
) -> std::io::Result<(TcpStream, Registration)> {
    let stream = stream.into_std()?;
    let registration = connections.register(stream.try_clone()?);

    Ok((TcpStream::from_std(stream)?, registration))
}

fn report(finished: Result<(), JoinError>) {
    if let Err(err) = finished {
        tracing::error!(action = "handle_connection", result = "fail", error = %err);
    }
}
