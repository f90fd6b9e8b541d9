//! Bus relay: many publishers in, many subscribers out.
//!
//! Every frame read from any ingress connection is queued on every egress
//! connection. The relay does not inspect topics; subscribers filter. Each
//! egress connection has its own high-water-mark queue so one slow reader
//! never stalls the others.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::frame::{read_frame, write_frame};
use super::{Message, MessageQueue, Result};

// ============================================================================
// Fanout
// ============================================================================

/// Registry of live egress queues.
#[derive(Debug, Default)]
struct Fanout {
    next_id: AtomicU64,
    queues: Mutex<HashMap<u64, Arc<MessageQueue>>>,
}

impl Fanout {
    fn register(&self, hwm: usize) -> (u64, Arc<MessageQueue>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(MessageQueue::new(hwm));
        self.lock().insert(id, queue.clone());
        (id, queue)
    }

    fn remove(&self, id: u64) {
        if let Some(queue) = self.lock().remove(&id) {
            queue.close();
        }
    }

    fn broadcast(&self, message: &Message) {
        for queue in self.lock().values() {
            queue.push(message.clone());
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<MessageQueue>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Bound relay ready to run.
pub struct Relay {
    ingress: TcpListener,
    egress: TcpListener,
    hwm: usize,
    fanout: Arc<Fanout>,
}

impl Relay {
    /// Bind the ingress and egress listeners (`host:port`; port 0 picks one).
    pub async fn bind(ingress: &str, egress: &str, hwm: usize) -> Result<Self> {
        let ingress = TcpListener::bind(ingress).await?;
        let egress = TcpListener::bind(egress).await?;

        info!(
            ingress = %ingress.local_addr()?,
            egress = %egress.local_addr()?,
            hwm,
            "Relay bound"
        );

        Ok(Self {
            ingress,
            egress,
            hwm,
            fanout: Arc::new(Fanout::default()),
        })
    }

    pub fn ingress_addr(&self) -> Result<SocketAddr> {
        Ok(self.ingress.local_addr()?)
    }

    pub fn egress_addr(&self) -> Result<SocketAddr> {
        Ok(self.egress.local_addr()?)
    }

    /// Bound `(ingress, egress)` addresses.
    pub fn local_addrs(&self) -> Result<(SocketAddr, SocketAddr)> {
        Ok((self.ingress_addr()?, self.egress_addr()?))
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.len()
    }

    /// Accept and forward until a listener fails.
    pub async fn run(&self) -> Result<()> {
        tokio::try_join!(self.accept_ingress(), self.accept_egress())?;
        Ok(())
    }

    async fn accept_ingress(&self) -> Result<()> {
        loop {
            let (stream, peer) = self.ingress.accept().await?;
            debug!(%peer, "Publisher connected to relay");
            let fanout = self.fanout.clone();
            tokio::spawn(async move {
                forward_ingress(stream, peer, fanout).await;
            });
        }
    }

    async fn accept_egress(&self) -> Result<()> {
        loop {
            let (stream, peer) = self.egress.accept().await?;
            let _ = stream.set_nodelay(true);
            let (id, queue) = self.fanout.register(self.hwm);
            debug!(%peer, id, "Subscriber connected to relay");
            let fanout = self.fanout.clone();
            tokio::spawn(async move {
                serve_egress(stream, peer, queue).await;
                fanout.remove(id);
                debug!(%peer, id, "Subscriber disconnected from relay");
            });
        }
    }
}

async fn forward_ingress(mut stream: TcpStream, peer: SocketAddr, fanout: Arc<Fanout>) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(message)) => fanout.broadcast(&message),
            Ok(None) => {
                debug!(%peer, "Publisher disconnected from relay");
                return;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Dropping publisher after bad frame");
                return;
            }
        }
    }
}

async fn serve_egress(stream: TcpStream, peer: SocketAddr, queue: Arc<MessageQueue>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut scratch = [0u8; 64];

    loop {
        tokio::select! {
            message = queue.pop() => {
                let Some(message) = message else { return };
                if let Err(e) = write_frame(&mut writer, &message).await {
                    debug!(%peer, error = %e, "Subscriber write failed");
                    return;
                }
            }
            // Subscribers never send; any read result means the peer is gone.
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) => return,
                    Ok(_) => {}
                    Err(e) => {
                        error!(%peer, error = %e, "Subscriber socket error");
                        return;
                    }
                }
            }
        }
    }
}
