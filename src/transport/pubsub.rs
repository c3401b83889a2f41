//! Publish fan-out and subscribe fan-in channels
//!
//! [`Publisher`] is the fan-out side: it accepts subscriber connections,
//! tracks each connection's topic-prefix subscriptions, and copies every
//! published message to the connections whose subscriptions match. Inbound
//! subscription frames are also surfaced to the owner so a forwarding engine
//! can relay them toward its upstreams.
//!
//! [`Subscriber`] is the fan-in side: upstream publish endpoints are added
//! dynamically, received messages from all of them merge into one stream,
//! and subscription frames sent by the owner are broadcast to every upstream
//! (and replayed to upstreams added later).
//!
//! Subscription frames are single-part messages: `0x01` followed by a topic
//! prefix subscribes, `0x00` unsubscribes. An empty prefix matches every
//! topic.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::trace;

use crate::error::{Error, Result};

use super::endpoint::Endpoint;
use super::frame::{self, Message};
use super::socket::{MessageListener, MessageSocket};

pub const SUBSCRIBE: u8 = 0x01;
pub const UNSUBSCRIBE: u8 = 0x00;

/// Build the single-part frame subscribing to `prefix`.
pub fn subscribe_frame(prefix: &[u8]) -> Message {
    let mut part = Vec::with_capacity(prefix.len() + 1);
    part.push(SUBSCRIBE);
    part.extend_from_slice(prefix);
    vec![part]
}

/// Build the single-part frame unsubscribing from `prefix`.
pub fn unsubscribe_frame(prefix: &[u8]) -> Message {
    let mut part = Vec::with_capacity(prefix.len() + 1);
    part.push(UNSUBSCRIBE);
    part.extend_from_slice(prefix);
    vec![part]
}

/// Publish fan-out channel.
pub struct Publisher {
    endpoint: Endpoint,
    fan_tx: broadcast::Sender<Message>,
    inbound_rx: mpsc::Receiver<Message>,
    _shutdown_tx: oneshot::Sender<()>,
}

impl Publisher {
    /// Bind to an ephemeral loopback port.
    pub async fn bind_local() -> Result<Self> {
        Self::bind(&Endpoint::new("127.0.0.1", 0)).await
    }

    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = MessageListener::bind(endpoint).await?;
        let endpoint = listener.local_endpoint().clone();

        let (fan_tx, _) = broadcast::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(accept_subscribers(
            listener,
            fan_tx.clone(),
            inbound_tx,
            shutdown_rx,
        ));

        Ok(Self {
            endpoint,
            fan_tx,
            inbound_rx,
            _shutdown_tx: shutdown_tx,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Fan a message out to every matching subscriber connection.
    ///
    /// Having no subscribers is not an error; the message is dropped.
    pub fn publish(&self, message: Message) {
        let _ = self.fan_tx.send(message);
    }

    /// Next subscription frame received from any subscriber connection.
    pub async fn next_inbound(&mut self) -> Option<Message> {
        self.inbound_rx.recv().await
    }
}

async fn accept_subscribers(
    listener: MessageListener,
    fan_tx: broadcast::Sender<Message>,
    inbound_tx: mpsc::Sender<Message>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(socket) => {
                    tokio::spawn(serve_subscriber(
                        socket,
                        fan_tx.subscribe(),
                        inbound_tx.clone(),
                    ));
                }
                Err(e) => {
                    trace!("publisher accept failed: {e}");
                }
            },

            _ = &mut shutdown_rx => break,
        }
    }
}

async fn serve_subscriber(
    socket: MessageSocket,
    mut fan_rx: broadcast::Receiver<Message>,
    inbound_tx: mpsc::Sender<Message>,
) {
    let (read_half, mut write_half) = socket.into_split();

    let filters: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    let reader = tokio::spawn(read_subscriptions(read_half, filters.clone(), inbound_tx));

    loop {
        match fan_rx.recv().await {
            Ok(message) => {
                if !matches_filters(&filters, &message) {
                    continue;
                }

                if frame::write_message(&mut write_half, &message).await.is_err() {
                    break;
                }
            }
            // a slow subscriber may drop messages, never block the publisher
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                trace!("subscriber lagged, dropped {missed} messages");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    reader.abort();
}

async fn read_subscriptions(
    mut read_half: OwnedReadHalf,
    filters: Arc<Mutex<Vec<Vec<u8>>>>,
    inbound_tx: mpsc::Sender<Message>,
) {
    loop {
        match frame::read_message(&mut read_half).await {
            Ok(message) => {
                apply_subscription(&filters, &message);

                // surface to the owner; dropped if the owner is not relaying
                let _ = inbound_tx.try_send(message);
            }
            Err(_) => break,
        }
    }
}

fn apply_subscription(filters: &Mutex<Vec<Vec<u8>>>, message: &Message) {
    let Some(part) = message.first() else {
        return;
    };

    let Some((&op, prefix)) = part.split_first() else {
        return;
    };

    let mut filters = filters.lock().expect("filter lock poisoned");

    match op {
        SUBSCRIBE => {
            if !filters.iter().any(|p| p == prefix) {
                filters.push(prefix.to_vec());
            }
        }
        UNSUBSCRIBE => {
            filters.retain(|p| p != prefix);
        }
        _ => {}
    }
}

fn matches_filters(filters: &Mutex<Vec<Vec<u8>>>, message: &Message) -> bool {
    let Some(topic) = message.first() else {
        return false;
    };

    let filters = filters.lock().expect("filter lock poisoned");
    filters.iter().any(|prefix| topic.starts_with(prefix))
}

/// Subscribe fan-in channel.
pub struct Subscriber {
    message_tx: mpsc::Sender<Message>,
    message_rx: mpsc::Receiver<Message>,
    upstreams: Vec<mpsc::Sender<Message>>,
    subscriptions: BTreeSet<Vec<u8>>,
}

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(256);

        Self {
            message_tx,
            message_rx,
            upstreams: Vec::new(),
            subscriptions: BTreeSet::new(),
        }
    }

    /// Connect to an upstream publish endpoint.
    ///
    /// The net subscription state is replayed to the new upstream, one
    /// frame per active prefix, so a late-added source honors existing
    /// subscriptions.
    pub async fn add(&mut self, endpoint: &Endpoint) -> Result<()> {
        let socket = MessageSocket::connect(endpoint).await?;
        let (read_half, write_half) = socket.into_split();

        let (out_tx, out_rx) = mpsc::channel(64);

        tokio::spawn(pump_outbound(write_half, out_rx));
        tokio::spawn(pump_inbound(read_half, self.message_tx.clone()));

        for prefix in &self.subscriptions {
            if out_tx.send(subscribe_frame(prefix)).await.is_err() {
                return Err(Error::Transport(format!(
                    "upstream {endpoint} closed during subscription replay"
                )));
            }
        }

        self.upstreams.push(out_tx);

        Ok(())
    }

    /// Send a subscription frame to every connected upstream.
    ///
    /// Subscribe and unsubscribe frames also update the net state replayed
    /// to upstreams added later; repeated frames for the same prefix
    /// collapse into one entry.
    pub async fn send(&mut self, message: Message) {
        self.track(&message);

        let mut alive = Vec::with_capacity(self.upstreams.len());

        for tx in self.upstreams.drain(..) {
            if tx.send(message.clone()).await.is_ok() {
                alive.push(tx);
            }
        }

        self.upstreams = alive;
    }

    fn track(&mut self, message: &Message) {
        let Some(part) = message.first() else {
            return;
        };

        let Some((&op, prefix)) = part.split_first() else {
            return;
        };

        match op {
            SUBSCRIBE => {
                self.subscriptions.insert(prefix.to_vec());
            }
            UNSUBSCRIBE => {
                self.subscriptions.remove(prefix);
            }
            _ => {}
        }
    }

    /// Subscribe to every topic on every upstream.
    pub async fn subscribe_all(&mut self) {
        self.send(subscribe_frame(&[])).await;
    }

    /// Next message from any upstream. Pends while no upstream has data.
    pub async fn recv(&mut self) -> Option<Message> {
        self.message_rx.recv().await
    }
}

async fn pump_outbound(mut write_half: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Message>) {
    while let Some(message) = out_rx.recv().await {
        if frame::write_message(&mut write_half, &message).await.is_err() {
            break;
        }
    }
}

async fn pump_inbound(mut read_half: OwnedReadHalf, message_tx: mpsc::Sender<Message>) {
    loop {
        match frame::read_message(&mut read_half).await {
            Ok(message) => {
                if message_tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
