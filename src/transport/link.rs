//! A bound or connected message link and its background tasks.
//!
//! ```text
//!            send()                          ┌──────────────┐
//!   Port ──────────▶ outbound queue ────────▶│ peer writer  │──▶ socket
//!                                            ├──────────────┤
//!   Port ◀────────── inbound queue ◀─────────│ peer reader  │◀── socket
//!            recv()                          └──────────────┘
//!                                                   │ connect / EOF
//!                                                   ▼
//!                                     state watch + connection events
//! ```
//!
//! A bound link serves any number of peers; every peer writer pulls from the
//! same outbound queue, so outbound messages are spread across peers. A
//! connecting link dials until the first peer answers and never reconnects
//! after that peer goes away.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backon::Retryable;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::acceptor::{self, Acceptor, BoxedStream};
use super::codec;
use super::{Endpoint, LinkOptions, Result, TransportContext, TransportError};
use crate::packet::Frames;
use crate::utils::retry::reconnect_backoff;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No peer has connected yet.
    Pending,
    /// At least one peer is connected.
    Connected,
    /// Every peer that connected has gone away.
    Disconnected,
    /// Closed locally.
    Closed,
}

impl LinkState {
    /// Disconnected and Closed never lead back to Connected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    fn terminal_error(self) -> TransportError {
        match self {
            Self::Closed => TransportError::Closed,
            _ => TransportError::Disconnected,
        }
    }
}

/// State shared between a link and its peer tasks.
struct Shared {
    state: watch::Sender<LinkState>,
    events: Mutex<Option<mpsc::UnboundedSender<bool>>>,
    inbound: mpsc::Sender<Frames>,
    outbound: tokio::sync::Mutex<mpsc::Receiver<Frames>>,
    peers: AtomicUsize,
}

impl Shared {
    fn emit(&self, connected: bool) {
        if let Ok(events) = self.events.lock() {
            if let Some(tx) = events.as_ref() {
                let _ = tx.send(connected);
            }
        }
    }

    fn peer_connected(&self, peer: &str) {
        self.peers.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if *state == LinkState::Pending {
                *state = LinkState::Connected;
                true
            } else {
                false
            }
        });
        info!(peer = %peer, "Peer connected");
        self.emit(true);
    }

    fn peer_disconnected(&self, peer: &str) {
        let remaining = self.peers.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        if remaining == 0 {
            self.state.send_if_modified(|state| {
                if *state == LinkState::Connected {
                    *state = LinkState::Disconnected;
                    true
                } else {
                    false
                }
            });
        }
        info!(peer = %peer, remaining, "Peer disconnected");
        self.emit(false);
    }
}

/// One transport endpoint, either bound or connected.
pub struct Link {
    shared: Arc<Shared>,
    endpoint: Endpoint,
    /// Registry holding this link's `inproc://` binding.
    inproc: Option<TransportContext>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Frames>>,
    outbound: mpsc::Sender<Frames>,
    events: Mutex<Option<mpsc::UnboundedReceiver<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Link {
    fn new(endpoint: Endpoint, options: &LinkOptions) -> (Self, Arc<Shared>) {
        let capacity = options.high_water_mark.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(LinkState::Pending);

        let shared = Arc::new(Shared {
            state,
            events: Mutex::new(Some(events_tx)),
            inbound: inbound_tx,
            outbound: tokio::sync::Mutex::new(outbound_rx),
            peers: AtomicUsize::new(0),
        });

        let link = Self {
            shared: shared.clone(),
            endpoint,
            inproc: None,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            outbound: outbound_tx,
            events: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
        };
        (link, shared)
    }

    /// Bind the endpoint and start accepting peers.
    pub(crate) async fn bind(
        context: &TransportContext,
        endpoint: &Endpoint,
        options: &LinkOptions,
    ) -> Result<Self> {
        let acceptor = acceptor::bind(context, endpoint).await?;
        let (mut link, shared) = Self::new(acceptor.local_endpoint(), options);
        if matches!(endpoint, Endpoint::Inproc(_)) {
            link.inproc = Some(context.clone());
        }
        link.track(tokio::spawn(accept_loop(shared, acceptor)));
        Ok(link)
    }

    /// Start dialing the endpoint in the background.
    pub(crate) fn connect(
        context: &TransportContext,
        endpoint: &Endpoint,
        options: &LinkOptions,
    ) -> Self {
        let (link, shared) = Self::new(endpoint.clone(), options);
        link.track(tokio::spawn(connect_loop(
            shared,
            context.clone(),
            endpoint.clone(),
            options.clone(),
        )));
        link
    }

    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    /// Bound address for bind links, target address for connect links.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.shared.state.subscribe()
    }

    /// Take the connection-event receiver. Only the first call gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<bool>> {
        self.events.lock().ok().and_then(|mut events| events.take())
    }

    /// Queue a message for the peer.
    ///
    /// Waits while the outbound queue is at its high-water mark. Fails once
    /// the link has disconnected or been closed. Oversize messages are
    /// rejected here and leave the link up.
    pub async fn send(&self, frames: Frames) -> Result<()> {
        codec::check(&frames)?;
        let state = self.state();
        if state.is_terminal() {
            return Err(state.terminal_error());
        }

        tokio::select! {
            sent = self.outbound.send(frames) => sent.map_err(|_| TransportError::Closed),
            err = wait_terminal(self.watch_state()) => Err(err),
        }
    }

    /// Wait for the next message.
    ///
    /// Messages already queued are delivered even after the peer has gone.
    pub async fn recv(&self) -> Result<Frames> {
        let mut inbound = self.inbound.lock().await;
        if let Ok(frames) = inbound.try_recv() {
            return Ok(frames);
        }

        let terminal = tokio::select! {
            biased;
            frames = inbound.recv() => return frames.ok_or(TransportError::Closed),
            err = wait_terminal(self.watch_state()) => err,
        };
        inbound.try_recv().map_err(|_| terminal)
    }

    /// Take the next message if one is queued.
    pub fn try_recv(&self) -> Result<Frames> {
        if self.state() == LinkState::Closed {
            return Err(TransportError::Closed);
        }
        let mut inbound = self
            .inbound
            .try_lock()
            .map_err(|_| TransportError::WouldBlock)?;
        inbound.try_recv().map_err(|_| TransportError::WouldBlock)
    }

    pub fn is_closed(&self) -> bool {
        self.state() == LinkState::Closed
    }

    /// Tear the link down. Safe to call more than once.
    pub fn close(&self) {
        let previous = self.shared.state.send_replace(LinkState::Closed);
        if previous == LinkState::Closed {
            return;
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if let Ok(mut events) = self.shared.events.lock() {
            events.take();
        }
        if let (Some(context), Endpoint::Inproc(name)) = (&self.inproc, &self.endpoint) {
            context.release_inproc(name);
        }
        debug!(endpoint = %self.endpoint, "Link closed");
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
    }
}

async fn wait_terminal(mut state: watch::Receiver<LinkState>) -> TransportError {
    match state.wait_for(|s| s.is_terminal()).await {
        Ok(s) => s.terminal_error(),
        Err(_) => TransportError::Closed,
    }
}

async fn accept_loop(shared: Arc<Shared>, mut acceptor: Box<dyn Acceptor>) {
    let mut peers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = acceptor.accept() => match accepted {
                Ok(Some((stream, peer))) => {
                    peers.spawn(serve_peer(shared.clone(), stream, peer));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = peers.join_next() => {}
        }
    }

    drop(acceptor);
    while peers.join_next().await.is_some() {}
}

async fn connect_loop(
    shared: Arc<Shared>,
    context: TransportContext,
    endpoint: Endpoint,
    options: LinkOptions,
) {
    let dialed = (|| {
        let ctx = context.clone();
        let ep = endpoint.clone();
        async move { acceptor::dial(&ctx, &ep).await }
    })
    .retry(reconnect_backoff(&options))
    .notify(|err: &TransportError, dur: Duration| {
        debug!(endpoint = %endpoint, error = %err, delay = ?dur, "Peer not reachable, retrying");
    })
    .await;

    match dialed {
        Ok(stream) => serve_peer(shared, stream, endpoint.to_string()).await,
        Err(e) => error!(endpoint = %endpoint, error = %e, "Giving up on peer"),
    }
}

async fn serve_peer(shared: Arc<Shared>, stream: BoxedStream, peer: String) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    shared.peer_connected(&peer);

    let inbound = shared.inbound.clone();
    let read_loop = async {
        loop {
            match codec::read_message(&mut reader).await {
                Ok(Some(frames)) => {
                    if inbound.send(frames).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "Peer closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Dropping peer after read failure");
                    break;
                }
            }
        }
    };

    let write_loop = async {
        loop {
            let next = {
                let mut outbound = shared.outbound.lock().await;
                outbound.recv().await
            };
            let Some(frames) = next else { break };
            if let Err(e) = codec::write_message(&mut writer, &frames).await {
                warn!(peer = %peer, error = %e, "Dropping peer after write failure");
                break;
            }
        }
    };

    tokio::select! {
        _ = read_loop => {}
        _ = write_loop => {}
    }

    shared.peer_disconnected(&peer);
}
