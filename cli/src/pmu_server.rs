//! # PMU Protocol Server
//!
//! TCP server answering IEEE C37.118 command frames from PDCs and pushing DATA frames to
//! connections that turned transmission on.
//!
//! Each connection runs one request at a time through `RequestState`:
//! `AwaitingHeader` reads SYNC and FRAMESIZE, `AwaitingBody` reads the rest of the frame
//! under the body timeout, `Verifying` checks the CRC and `Dispatching` acts on the
//! command. Any rejection returns to `AwaitingHeader` without a response.
//!
//! A single forwarder task takes samples from the context's `SampleQueue`, encodes them
//! as complete DATA frames and broadcasts them to every connection; each connection writes
//! them only while its subscription flag is set.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;

use pmu_core::context::PmuContext;
use pmu_core::details::{PmuDetails, DEFAULT_PORT};
use pmu_core::ieee_c37_118::commands::{classify_command, CommandType, COMMAND_MINIMUM_FRAME_SIZE};
use pmu_core::ieee_c37_118::common::{classify_type, FrameType, ParseError};
use pmu_core::ieee_c37_118::data_frame::DataCodec;
use pmu_core::ieee_c37_118::utils::{validate_checksum_with_header, HEADER_BLOCK_SIZE};

pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CAPACITY: usize = 64;
const FRAME_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Server is not running")]
    AlreadyStopped,
    #[error("Invalid value '{value}' for {name}")]
    InvalidConfig { name: &'static str, value: String },
    #[error("Cannot prepare data frames: {0}")]
    Codec(#[from] ParseError),
}

/// Notifications published by a `PmuServer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Started(SocketAddr),
    Stopped,
    DataOn,
    DataOff,
    /// A CFG-1, CFG-2 or CFG-3 frame was requested.
    ConfigRequested(FrameType),
    HeaderRequested,
    Failed(String),
}

/// Network settings of the protocol server.
///
/// # Fields
///
/// * `bind_ip`: Address to listen on.
/// * `port`: TCP port, 0 picks an ephemeral port.
/// * `body_timeout`: Time allowed between a frame's header and the rest of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub body_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_ip: IpAddr, port: u16) -> Self {
        ServerConfig {
            bind_ip,
            port,
            ..ServerConfig::default()
        }
    }

    /// Listens on all interfaces at the port stored in the device details.
    pub fn from_details(details: &PmuDetails) -> Self {
        ServerConfig {
            port: details.port,
            ..ServerConfig::default()
        }
    }

    /// Reads `PMU_BIND_IP`, `PMU_PORT` and `PMU_BODY_TIMEOUT_MS`, keeping defaults for
    /// unset variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        if let Some(value) = lookup("PMU_BIND_IP") {
            config.bind_ip = value.trim().parse().map_err(|_| ServerError::InvalidConfig {
                name: "PMU_BIND_IP",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("PMU_PORT") {
            config.port = value.trim().parse().map_err(|_| ServerError::InvalidConfig {
                name: "PMU_PORT",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("PMU_BODY_TIMEOUT_MS") {
            let millis: u64 = value.trim().parse().map_err(|_| ServerError::InvalidConfig {
                name: "PMU_BODY_TIMEOUT_MS",
                value: value.clone(),
            })?;
            config.body_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    pub fn with_body_timeout(mut self, body_timeout: Duration) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

/// State shared by the accept loop, the forwarder and every connection.
struct Shared {
    context: PmuContext,
    events: broadcast::Sender<ServerEvent>,
    frames: broadcast::Sender<Bytes>,
    body_timeout: Duration,
}

impl Shared {
    fn emit(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_handle: JoinHandle<()>,
    forward_handle: JoinHandle<()>,
}

/// The PMU side of the IEEE C37.118 TCP protocol.
pub struct PmuServer {
    config: ServerConfig,
    context: PmuContext,
    events: broadcast::Sender<ServerEvent>,
    running: Mutex<Option<Running>>,
}

impl PmuServer {
    pub fn new(config: ServerConfig, context: PmuContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        PmuServer {
            config,
            context,
            events,
            running: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &PmuContext {
        &self.context
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Address the server is listening on, if started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Binds the listening socket and starts forwarding samples.
    ///
    /// Calling `start` on a running server returns the address it already listens on.
    /// A bind failure is returned and also published as `ServerEvent::Failed`.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            debug!("PMU server already listening on {}", r.local_addr);
            return Ok(r.local_addr);
        }

        let codec = match self.context.bind_codec() {
            Ok(codec) => codec,
            Err(e) => {
                let _ = self.events.send(ServerEvent::Failed(e.to_string()));
                return Err(e.into());
            }
        };

        let address = self.config.address();
        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(source) => {
                let error = ServerError::Bind { address, source };
                warn!("{}", error);
                let _ = self.events.send(ServerEvent::Failed(error.to_string()));
                return Err(error);
            }
        };
        let local_addr = listener.local_addr()?;

        self.context.samples.clear();
        let (frames, _) = broadcast::channel(FRAME_CAPACITY);
        let shared = Arc::new(Shared {
            context: self.context.clone(),
            events: self.events.clone(),
            frames,
            body_timeout: self.config.body_timeout,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_handle = tokio::spawn(accept_loop(listener, shared.clone(), shutdown_rx.clone()));
        let forward_handle = tokio::spawn(forward_samples(shared, codec, shutdown_rx));

        info!("PMU server listening on {}", local_addr);
        *running = Some(Running {
            local_addr,
            shutdown_tx,
            accept_handle,
            forward_handle,
        });
        let _ = self.events.send(ServerEvent::Started(local_addr));
        Ok(local_addr)
    }

    /// Closes the listening socket and every connection and halts forwarding.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let running = self.running.lock().await.take();
        let Some(running) = running else {
            return Err(ServerError::AlreadyStopped);
        };

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.accept_handle.await {
            warn!("Accept loop ended abnormally: {}", e);
        }
        if let Err(e) = running.forward_handle.await {
            warn!("Forwarder ended abnormally: {}", e);
        }
        self.context.samples.clear();

        info!("PMU server on {} stopped", running.local_addr);
        let _ = self.events.send(ServerEvent::Stopped);
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    info!("PDC connected from {}", peer);
                    connections.spawn(handle_connection(socket, peer, shared.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    connections.shutdown().await;
}

/// Encodes queued samples as complete DATA frames for the connections.
async fn forward_samples(
    shared: Arc<Shared>,
    mut codec: DataCodec,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let sample = tokio::select! {
            _ = shutdown.changed() => break,
            sample = shared.context.samples.next() => sample,
        };
        if shared.frames.receiver_count() == 0 {
            continue;
        }
        if let Err(e) = codec.decode(&sample, false) {
            debug!("Dropping malformed sample of {} bytes: {}", sample.len(), e);
            continue;
        }
        codec.update_time();
        match codec.encode(true) {
            Ok(frame) => {
                let _ = shared.frames.send(Bytes::from(frame));
            }
            Err(e) => warn!("Failed to encode data frame: {}", e),
        }
    }
    debug!("Forwarder stopped");
}

/// Aborts the wrapped task when dropped, so a connection's push task dies with it.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Writes broadcast DATA frames while `subscribed` is set.
async fn push_frames(
    mut frames: broadcast::Receiver<Bytes>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    subscribed: Arc<AtomicBool>,
) {
    loop {
        match frames.recv().await {
            Ok(frame) => {
                if !subscribed.load(Ordering::Acquire) {
                    continue;
                }
                if let Err(e) = writer.lock().await.write_all(&frame).await {
                    debug!("Stopping data push: {}", e);
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Connection lagging, skipped {} data frames", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

enum RequestState {
    AwaitingHeader,
    AwaitingBody {
        header: [u8; HEADER_BLOCK_SIZE],
        frame_size: usize,
    },
    Verifying {
        header: [u8; HEADER_BLOCK_SIZE],
        body: Vec<u8>,
    },
    Dispatching(CommandType),
}

/// Accepts a received SYNC + FRAMESIZE block if it opens a command frame of legal size.
///
/// A rejected block consumes only its own 4 bytes, so the rest of an undersized frame is
/// read as the next header and rejected in turn until the stream realigns on a SYNC.
fn admit_header(header: &[u8; HEADER_BLOCK_SIZE]) -> Option<usize> {
    if classify_type(header) != Some(FrameType::Command) {
        return None;
    }
    let frame_size = u16::from_be_bytes([header[2], header[3]]) as usize;
    (frame_size >= COMMAND_MINIMUM_FRAME_SIZE).then_some(frame_size)
}

async fn handle_connection(socket: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, e);
    }
    let (mut reader, writer) = socket.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let subscribed = Arc::new(AtomicBool::new(false));
    let _push = AbortOnDrop(tokio::spawn(push_frames(
        shared.frames.subscribe(),
        writer.clone(),
        subscribed.clone(),
    )));

    let mut state = RequestState::AwaitingHeader;
    loop {
        state = match state {
            RequestState::AwaitingHeader => {
                let mut header = [0u8; HEADER_BLOCK_SIZE];
                match reader.read_exact(&mut header).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        info!("PDC {} disconnected", peer);
                        break;
                    }
                    Err(e) => {
                        warn!("Read from {} failed: {}", peer, e);
                        break;
                    }
                }
                match admit_header(&header) {
                    Some(frame_size) => RequestState::AwaitingBody { header, frame_size },
                    None => {
                        debug!("{}: ignoring header {:02X?}", peer, header);
                        RequestState::AwaitingHeader
                    }
                }
            }
            RequestState::AwaitingBody { header, frame_size } => {
                let mut body = vec![0u8; frame_size - HEADER_BLOCK_SIZE];
                match time::timeout(shared.body_timeout, reader.read_exact(&mut body)).await {
                    Ok(Ok(_)) => RequestState::Verifying { header, body },
                    Ok(Err(e)) => {
                        debug!("{}: connection closed mid-frame: {}", peer, e);
                        break;
                    }
                    Err(_) => {
                        debug!(
                            "{}: no frame body within {:?}, request discarded",
                            peer, shared.body_timeout
                        );
                        RequestState::AwaitingHeader
                    }
                }
            }
            RequestState::Verifying { header, body } => {
                match validate_checksum_with_header(Some(&header), &body)
                    .and_then(|_| classify_command(&body, false))
                {
                    Ok(command) => RequestState::Dispatching(command),
                    Err(e) => {
                        debug!("{}: dropping command frame: {}", peer, e);
                        RequestState::AwaitingHeader
                    }
                }
            }
            RequestState::Dispatching(command) => {
                if let Err(e) = dispatch(command, &shared, &writer, &subscribed).await {
                    warn!("{}: failed to answer {}: {}", peer, command, e);
                    break;
                }
                RequestState::AwaitingHeader
            }
        };
    }
}

async fn send_frame(
    writer: &Mutex<OwnedWriteHalf>,
    frame: Result<Vec<u8>, ParseError>,
) -> Result<(), ServerError> {
    let frame = frame?;
    writer.lock().await.write_all(&frame).await?;
    Ok(())
}

async fn dispatch(
    command: CommandType,
    shared: &Shared,
    writer: &Mutex<OwnedWriteHalf>,
    subscribed: &AtomicBool,
) -> Result<(), ServerError> {
    match command {
        CommandType::TurnOffTransmission => {
            subscribed.store(false, Ordering::Release);
            info!("Data transmission off");
            shared.emit(ServerEvent::DataOff);
        }
        CommandType::TurnOnTransmission => {
            subscribed.store(true, Ordering::Release);
            info!("Data transmission on");
            shared.emit(ServerEvent::DataOn);
        }
        CommandType::SendConfigFrame1 | CommandType::SendConfigFrame2 => {
            let kind = if command == CommandType::SendConfigFrame1 {
                FrameType::Config1
            } else {
                FrameType::Config2
            };
            send_frame(writer, shared.context.config_frame(kind)).await?;
            shared.emit(ServerEvent::ConfigRequested(kind));
        }
        CommandType::SendHeaderFrame => {
            send_frame(writer, shared.context.header_frame()).await?;
            shared.emit(ServerEvent::HeaderRequested);
        }
        CommandType::SendConfigFrame3 => {
            debug!("CFG-3 requested, not supported");
            shared.emit(ServerEvent::ConfigRequested(FrameType::Config3));
        }
        CommandType::SendExtendedFrame | CommandType::User(_) => {
            debug!("Accepted {} without response", command);
        }
        CommandType::Invalid(code) => {
            debug!("Ignoring invalid command 0x{:04X}", code);
        }
    }
    Ok(())
}
