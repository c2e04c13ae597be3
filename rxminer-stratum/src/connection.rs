use crate::{
    config::{SessionCredentials, StratumConfig},
    correlator::Correlator,
    error::{ConnectCause, Result, StratumError},
    framing::FrameReader,
    job::{Job, JobSlot},
    protocol::{Incoming, RpcResponse},
    variant::{PoolVariant, VariantKind},
};
use serde_json::Value;
use std::{fmt, io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, tcp::OwnedWriteHalf, TcpStream},
    sync::{oneshot, watch, Mutex, RwLock},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Resolving,
    Connected,
    /// Subscribe sent (standard dialect only)
    Subscribed,
    Authorizing,
    Authorized,
    /// Authorized and processing frames
    Receiving,
    /// Closed by us or by the pool
    Closed,
    Failed(String),
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// State shared between the handle and its receive loop
struct Shared {
    endpoint: String,
    state: RwLock<ConnectionState>,

    /// Locked before `correlator` on the send path, so ids reach the wire
    /// in order and writes never interleave
    writer: Mutex<Option<OwnedWriteHalf>>,
    correlator: Mutex<Correlator>,

    jobs: JobSlot,
    session_id: RwLock<Option<String>>,

    /// Bound on one `write_all`, so a pool that stops reading cannot hold
    /// the writer lock forever
    write_timeout: Duration,

    /// Cancelled once the receive loop has exited
    finished: CancellationToken,
}

impl Shared {
    fn new(endpoint: String, write_timeout: Duration) -> Self {
        Self {
            endpoint,
            state: RwLock::new(ConnectionState::Connecting),
            writer: Mutex::new(None),
            correlator: Mutex::new(Correlator::new()),
            jobs: JobSlot::new(),
            session_id: RwLock::new(None),
            write_timeout,
            finished: CancellationToken::new(),
        }
    }

    /// Move to `next` unless the session already ended
    async fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write().await;
        if state.is_terminal() {
            if *state != next {
                debug!(endpoint = %self.endpoint, "Staying {} (not {})", *state, next);
            }
            return;
        }
        if *state != next {
            debug!(endpoint = %self.endpoint, "State {} -> {}", *state, next);
            *state = next;
        }
    }

    async fn send(
        &self,
        payload: Value,
        responder: Option<oneshot::Sender<RpcResponse>>,
    ) -> Result<u64> {
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(StratumError::ConnectionClosed)?;

        let (id, line) = {
            let mut correlator = self.correlator.lock().await;
            let (id, line) = correlator.prepare(payload)?;
            if let Some(tx) = responder {
                correlator.await_response(id, tx);
            }
            (id, line)
        };

        debug!(id, "Sending: {}", line.trim_end());

        let failure = match timeout(self.write_timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => return Ok(id),
            Ok(Err(e)) => {
                error!(endpoint = %self.endpoint, "Write error: {}", e);
                StratumError::Transport(e)
            }
            Err(_) => {
                error!(endpoint = %self.endpoint, id, "Write timed out");
                StratumError::Timeout(id)
            }
        };

        // A partly written line leaves the stream unusable
        writer.take();
        self.correlator.lock().await.cancel(id);
        self.transition(ConnectionState::Failed(failure.to_string())).await;
        Err(failure)
    }

    fn publish(&self, job: Job) {
        match job.difficulty() {
            Some(difficulty) => info!(fingerprint = %job.fingerprint(), difficulty, "New {}", job),
            None => info!(fingerprint = %job.fingerprint(), "New {}", job),
        }
        self.jobs.publish(job);
    }

    async fn correlate(&self, response: RpcResponse) {
        let Some(id) = response.id.clone() else {
            debug!("Response without id: {}", response.result);
            return;
        };

        let resolved = self.correlator.lock().await.resolve(&id);
        match resolved {
            Ok(pending) => {
                if let Some(error) = &response.error {
                    warn!(id = pending.id, method = ?pending.method(), "Pool returned error: {}", error);
                } else {
                    debug!(id = pending.id, method = ?pending.method(), "Matched response");
                }
                pending.respond(response);
            }
            Err(e) => warn!(endpoint = %self.endpoint, "{}", e),
        }
    }

    /// Handle one frame. Bad frames are logged and dropped; they never end
    /// the session.
    async fn dispatch(&self, variant: &mut dyn PoolVariant, frame: &str) {
        trace!(frame, "Received");

        let was_authorized = variant.is_authorized();
        let (job, response) = match variant.parse_frame(frame) {
            Ok(Incoming::Job(job)) => (Some(job), None),
            Ok(Incoming::Response(mut response)) => (response.job.take(), Some(response)),
            Ok(Incoming::Notice { method }) => {
                debug!(method, "Ignoring notification");
                (None, None)
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, "Discarding frame: {}", e);
                (None, None)
            }
        };

        // Checked even for a discarded frame, the variant may have moved on
        if variant.is_authorized() {
            if !was_authorized {
                let session_id = variant.session_id().map(str::to_string);
                info!(endpoint = %self.endpoint, session_id = ?session_id, "Worker authorized");
                *self.session_id.write().await = session_id;
                self.transition(ConnectionState::Authorized).await;
            }
            self.transition(ConnectionState::Receiving).await;
        }

        // Session state is settled before anyone is woken
        if let Some(response) = response {
            self.correlate(response).await;
        }
        if let Some(job) = job {
            self.publish(job);
        }
    }

    /// Release everything the session owned
    async fn finish(&self, outcome: ConnectionState) {
        for pending in self.correlator.lock().await.drain() {
            warn!(id = pending.id, method = ?pending.method(), "Request unanswered at close");
        }

        self.writer.lock().await.take();
        self.jobs.clear();
        self.transition(outcome).await;
        self.finished.cancel();
    }
}

/// Read, frame and dispatch until the stream ends, fails or `shutdown` fires
async fn receive_loop<R>(
    mut reader: R,
    mut variant: Box<dyn PoolVariant>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    mut frames: FrameReader,
    read_buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_buffer_size.max(1)];

    let outcome = loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break ConnectionState::Closed,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                if !frames.pending().is_empty() {
                    debug!(bytes = frames.pending().len(), "Unterminated data at end of stream");
                }
                info!(endpoint = %shared.endpoint, "Pool closed the connection");
                break ConnectionState::Closed;
            }
            Ok(n) => n,
            Err(e) => {
                error!(endpoint = %shared.endpoint, "Read error: {}", e);
                break ConnectionState::Failed(e.to_string());
            }
        };

        for frame in frames.feed(&buf[..n]) {
            match frame {
                Ok(frame) => shared.dispatch(variant.as_mut(), &frame).await,
                Err(e) => warn!(endpoint = %shared.endpoint, "Discarding frame: {}", e),
            }
        }
    };

    shared.finish(outcome).await;
}

fn connect_error(credentials: &SessionCredentials, cause: ConnectCause, source: io::Error) -> StratumError {
    StratumError::Connect {
        host: credentials.host.clone(),
        port: credentials.port.clone(),
        cause,
        source,
    }
}

async fn resolve(credentials: &SessionCredentials, limit: Duration) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = timeout(limit, lookup_host(credentials.endpoint()))
        .await
        .map_err(|_| {
            connect_error(
                credentials,
                ConnectCause::Timeout,
                io::Error::new(io::ErrorKind::TimedOut, "name resolution timed out"),
            )
        })?
        .map_err(|e| connect_error(credentials, ConnectCause::Resolve, e))?
        .collect();

    if addrs.is_empty() {
        return Err(connect_error(
            credentials,
            ConnectCause::Resolve,
            io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        ));
    }

    Ok(addrs)
}

async fn connect_any(
    credentials: &SessionCredentials,
    addrs: &[SocketAddr],
    limit: Duration,
) -> Result<TcpStream> {
    let mut last = None;

    for addr in addrs {
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => {
                debug!(%addr, "Connect attempt failed: {}", e);
                last = Some((ConnectCause::Connect, e));
            }
            Err(_) => {
                debug!(%addr, "Connect attempt timed out");
                last = Some((
                    ConnectCause::Timeout,
                    io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                ));
            }
        }
    }

    let (cause, source) = last.unwrap_or_else(|| {
        (
            ConnectCause::Connect,
            io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to"),
        )
    });
    Err(connect_error(credentials, cause, source))
}

/// Stratum connection handler
///
/// Owns the socket and the current job. Frames are processed by a single
/// receive task in arrival order; requests may be sent from any task.
pub struct StratumConnection {
    shared: Arc<Shared>,
    kind: VariantKind,
    shutdown: CancellationToken,
    receiver: Mutex<Option<JoinHandle<()>>>,
    response_timeout: Duration,
}

impl StratumConnection {
    /// Connect to the pool and log in.
    ///
    /// Sends the variant's subscribe payload (if any) and its authorize
    /// payload. Authorization completes asynchronously, see [`state`].
    ///
    /// [`state`]: StratumConnection::state
    pub async fn open(
        credentials: SessionCredentials,
        variant: Box<dyn PoolVariant>,
        config: &StratumConfig,
    ) -> Result<Self> {
        let endpoint = credentials.endpoint();
        info!("Connecting to {} ({})", endpoint, variant.kind());

        let shared = Arc::new(Shared::new(endpoint.clone(), config.response_timeout()));
        shared.transition(ConnectionState::Resolving).await;

        let addrs = match resolve(&credentials, config.connection_timeout()).await {
            Ok(addrs) => addrs,
            Err(e) => return Err(Self::abort(&shared, e).await),
        };

        let stream = match connect_any(&credentials, &addrs, config.connection_timeout()).await {
            Ok(stream) => stream,
            Err(e) => return Err(Self::abort(&shared, e).await),
        };

        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        *shared.writer.lock().await = Some(write_half);
        shared.transition(ConnectionState::Connected).await;
        info!("Connected to {}", endpoint);

        let kind = variant.kind();
        let subscribe = variant.build_subscribe(&credentials);
        let authorize = variant.build_authorize(&credentials);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(
            read_half,
            variant,
            shared.clone(),
            shutdown.clone(),
            FrameReader::with_max_length(config.max_frame_length),
            config.read_buffer_size,
        ));

        let connection = Self {
            shared,
            kind,
            shutdown,
            receiver: Mutex::new(Some(handle)),
            response_timeout: config.response_timeout(),
        };

        if let Err(e) = connection.login(subscribe, authorize).await {
            let _ = connection.close().await;
            return Err(e);
        }

        Ok(connection)
    }

    async fn abort(shared: &Shared, e: StratumError) -> StratumError {
        error!("{}", e);
        shared.transition(ConnectionState::Failed(e.to_string())).await;
        e
    }

    async fn login(&self, subscribe: Option<Value>, authorize: Value) -> Result<()> {
        if let Some(subscribe) = subscribe {
            self.send(subscribe).await?;
            self.shared.transition(ConnectionState::Subscribed).await;
        }

        self.shared.transition(ConnectionState::Authorizing).await;
        self.send(authorize).await?;
        Ok(())
    }

    /// Send a request without waiting for its response.
    ///
    /// The response is still matched by id when it arrives.
    pub async fn send(&self, payload: Value) -> Result<u64> {
        self.shared.send(payload, None).await
    }

    /// Send a request and wait for the matching response
    pub async fn request(&self, payload: Value) -> Result<RpcResponse> {
        let (tx, rx) = oneshot::channel();
        let id = self.shared.send(payload, Some(tx)).await?;

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(StratumError::ConnectionClosed),
            Err(_) => {
                self.shared.correlator.lock().await.cancel(id);
                warn!(id, "Request timed out");
                Err(StratumError::Timeout(id))
            }
        }
    }

    /// Most recent job, `None` before the first or after close
    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.shared.jobs.current()
    }

    /// Receiver marked changed whenever the current job changes
    pub fn subscribe_jobs(&self) -> watch::Receiver<u64> {
        self.shared.jobs.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state.read().await.clone()
    }

    pub async fn is_authorized(&self) -> bool {
        matches!(
            self.state().await,
            ConnectionState::Authorized | ConnectionState::Receiving
        )
    }

    pub async fn session_id(&self) -> Option<String> {
        self.shared.session_id.read().await.clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn variant(&self) -> VariantKind {
        self.kind
    }

    /// Resolves once the receive loop has stopped
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await
    }

    /// Shut down both directions and wait for the receive loop to stop
    pub async fn close(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(StratumError::ConnectionClosed);
        }

        info!("Disconnecting from {}", self.shared.endpoint);
        self.shutdown.cancel();

        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        if let Some(handle) = self.receiver.lock().await.take() {
            let _ = handle.await;
        }

        Ok(())
    }
}

impl Drop for StratumConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
