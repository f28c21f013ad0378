//! SSH client session.
//!
//! [`SshClient`] drives one connection through its whole life:
//!
//! ```text
//! Disconnected -> Connecting (TCP, version exchange, KEX, NEWKEYS)
//!              -> Authenticating (password)
//!              -> Connected -> execute_command* -> Disconnected
//! ```
//!
//! The API reports outcomes as booleans and keeps a status snapshot (state,
//! last error, cumulative output) that can be read from any task while
//! another one is doing network I/O.
//!
//! # Example
//!
//! ```rust,no_run
//! use picoware_proto::ssh::client::{SshClient, SshClientConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = SshClient::new(SshClientConfig::default());
//!
//! if client.connect("192.168.1.10", 22, "pi", "raspberry").await {
//!     client.execute_command("uname -a").await;
//!     for line in client.output() {
//!         println!("{}", line);
//!     }
//!     client.disconnect().await;
//! } else {
//!     eprintln!("{}", client.error().unwrap_or_default());
//! }
//! # }
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use picoware_platform::{PicoError, PicoResult};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::auth::authenticate_password;
use super::channel::{self, ChannelParams};
use super::crypto::CtrBackend;
use super::exchange::{host_key_fingerprint, ExchangeContext, GexRequest, KexMethod};
use super::kex::{negotiate, server_guess_is_wrong, KexInit, NegotiatedAlgorithms, NewKeys};
use super::kex_dh::SessionKeys;
use super::message::MessageType;
use super::transport::{AsyncStream, Disconnect, DisconnectReason, Transport};
use super::version::{Version, DEFAULT_SOFTWARE_VERSION};

/// Description sent with SSH_MSG_DISCONNECT on [`SshClient::disconnect`].
pub const DISCONNECT_DESCRIPTION: &str = "Disconnected by application";

/// SSH client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshClientConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for every individual read.
    pub read_timeout: Duration,
    /// Software version announced in `SSH-2.0-<software_version>`.
    pub software_version: String,
    /// Initial channel window.
    pub window_size: u32,
    /// Maximum channel packet size.
    pub max_packet_size: u32,
    /// Group sizes for diffie-hellman-group-exchange.
    pub gex: GexRequest,
    /// AES-CTR keystream implementation.
    pub ctr_backend: CtrBackend,
}

impl Default for SshClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(15),
            software_version: DEFAULT_SOFTWARE_VERSION.to_string(),
            window_size: 2 * 1024 * 1024,
            max_packet_size: 32 * 1024,
            gex: GexRequest::default(),
            ctr_backend: CtrBackend::Native,
        }
    }
}

impl SshClientConfig {
    /// Checks the configuration for values that cannot work.
    pub fn validate(&self) -> PicoResult<()> {
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(PicoError::Config("Timeouts must be non-zero".to_string()));
        }
        if self.software_version.is_empty()
            || self.software_version.chars().any(char::is_whitespace)
        {
            return Err(PicoError::Config(format!(
                "Invalid software version: {:?}",
                self.software_version
            )));
        }
        let gex = &self.gex;
        if gex.min > gex.preferred || gex.preferred > gex.max {
            return Err(PicoError::Config(format!(
                "Group exchange sizes out of order: min={} preferred={} max={}",
                gex.min, gex.preferred, gex.max
            )));
        }
        if gex.min < 1024 {
            return Err(PicoError::Config(format!(
                "Group exchange minimum too small: {} bits",
                gex.min
            )));
        }
        if self.max_packet_size == 0 || self.max_packet_size > self.window_size {
            return Err(PicoError::Config(format!(
                "Invalid max packet size {} for window {}",
                self.max_packet_size, self.window_size
            )));
        }
        Ok(())
    }

    fn channel_params(&self) -> ChannelParams {
        ChannelParams {
            window_size: self.window_size,
            max_packet_size: self.max_packet_size,
        }
    }
}

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// No connection.
    #[default]
    Disconnected,
    /// TCP, version exchange and key exchange in progress.
    Connecting,
    /// Keys are in place; password authentication in progress.
    Authenticating,
    /// Authenticated and ready for commands.
    Connected,
}

#[derive(Debug, Default)]
struct Status {
    state: ClientState,
    // Set from begin_connect until the attempt succeeds or fails.
    attempt_in_flight: bool,
    error: Option<String>,
    output: Vec<String>,
    server_version: Option<String>,
    host_key_fingerprint: Option<String>,
    negotiated: Option<NegotiatedAlgorithms>,
}

struct Session {
    transport: Transport,
    session_id: Vec<u8>,
}

/// SSH client.
///
/// All methods take `&self`; share it behind an `Arc` to query status from
/// other tasks. Commands on one client run one at a time;
/// [`disconnect`](Self::disconnect) interrupts whatever is running.
pub struct SshClient {
    config: SshClientConfig,
    status: Mutex<Status>,
    session: tokio::sync::Mutex<Option<Session>>,
    // Disconnect generation; every bump cancels in-flight work.
    cancel: watch::Sender<u64>,
}

impl std::fmt::Debug for SshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new(SshClientConfig::default())
    }
}

impl SshClient {
    /// Creates a disconnected client.
    pub fn new(config: SshClientConfig) -> Self {
        Self {
            config,
            status: Mutex::new(Status::default()),
            session: tokio::sync::Mutex::new(None),
            cancel: watch::channel(0).0,
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SshClientConfig {
        &self.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ClientState {
        self.status().state
    }

    /// Returns true once authenticated and until disconnected.
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Returns the last error, if any.
    pub fn error(&self) -> Option<String> {
        self.status().error.clone()
    }

    /// Returns a copy of the session transcript.
    pub fn output(&self) -> Vec<String> {
        self.status().output.clone()
    }

    /// Returns the server identification line.
    pub fn server_version(&self) -> Option<String> {
        self.status().server_version.clone()
    }

    /// Returns the SHA-256 fingerprint of the server host key. The key is
    /// not verified.
    pub fn host_key_fingerprint(&self) -> Option<String> {
        self.status().host_key_fingerprint.clone()
    }

    /// Returns the algorithms chosen for this connection.
    pub fn negotiated(&self) -> Option<NegotiatedAlgorithms> {
        self.status().negotiated.clone()
    }

    /// Returns the session identifier (the first exchange hash).
    pub async fn session_id(&self) -> Option<Vec<u8>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.session_id.clone())
    }

    /// Connects over TCP and authenticates with a password.
    ///
    /// Returns false on any failure; [`error`](Self::error) then describes
    /// it and the socket is closed. A concurrent [`disconnect`](Self::disconnect)
    /// abandons the attempt.
    pub async fn connect(&self, host: &str, port: u16, username: &str, password: &str) -> bool {
        let Some(mut cancel) = self.begin_connect() else {
            return false;
        };
        let mut slot = self.session.lock().await;

        let addr = format!("{}:{}", host, port);
        info!(%addr, "Connecting");
        let connect_timeout = self.config.connect_timeout;
        let dial = async {
            match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
                Ok(result) => result.map_err(PicoError::from),
                Err(_) => Err(PicoError::Timeout(format!(
                    "connect to {} did not finish within {:?}",
                    addr, connect_timeout
                ))),
            }
        };
        let stream = match cancellable(&mut cancel, dial).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(e),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not set TCP_NODELAY");
        }

        self.establish(&mut slot, cancel, stream, username, password)
            .await
    }

    /// Runs the protocol over an already connected stream.
    pub async fn connect_stream<S: AsyncStream + 'static>(
        &self,
        stream: S,
        username: &str,
        password: &str,
    ) -> bool {
        let Some(cancel) = self.begin_connect() else {
            return false;
        };
        let mut slot = self.session.lock().await;
        self.establish(&mut slot, cancel, stream, username, password)
            .await
    }

    /// Claims the client for a connection attempt and returns the receiver
    /// that fires when [`disconnect`](Self::disconnect) is called.
    fn begin_connect(&self) -> Option<watch::Receiver<u64>> {
        let mut status = self.status();
        if status.attempt_in_flight {
            warn!(state = ?status.state, "Connect rejected: attempt in progress");
            status.error = Some("Connection already in progress".to_string());
            return None;
        }
        if status.state != ClientState::Disconnected {
            warn!(state = ?status.state, "Connect rejected: already connected");
            status.error = Some("Already connected".to_string());
            return None;
        }
        if let Err(e) = self.config.validate() {
            status.error = Some(e.to_string());
            return None;
        }

        *status = Status {
            state: ClientState::Connecting,
            attempt_in_flight: true,
            ..Status::default()
        };
        Some(self.cancel.subscribe())
    }

    fn fail(&self, err: PicoError) -> bool {
        error!(error = %err, "Connection failed");
        let mut status = self.status();
        status.state = ClientState::Disconnected;
        status.attempt_in_flight = false;
        status.error = Some(err.to_string());
        false
    }

    async fn establish<S: AsyncStream + 'static>(
        &self,
        slot: &mut Option<Session>,
        mut cancel: watch::Receiver<u64>,
        stream: S,
        username: &str,
        password: &str,
    ) -> bool {
        let mut transport = Transport::new(stream, self.config.read_timeout);

        let handshake = self.handshake(&mut transport, username, password);
        let result = cancellable(&mut cancel, handshake).await;
        let err = match result {
            Ok(session_id) => {
                let mut status = self.status();
                // disconnect() bumps the generation under this lock
                if !cancel.has_changed().unwrap_or(true) {
                    *slot = Some(Session {
                        transport,
                        session_id,
                    });
                    status.state = ClientState::Connected;
                    status.attempt_in_flight = false;
                    info!(user = username, "Connected");
                    return true;
                }
                cancelled()
            }
            Err(e) => e,
        };

        if let Err(close_err) = transport.shutdown().await {
            debug!(error = %close_err, "Shutdown after failure");
        }
        self.fail(err)
    }

    /// Version exchange, key exchange, NEWKEYS and authentication. Returns
    /// the session identifier.
    async fn handshake(
        &self,
        transport: &mut Transport,
        username: &str,
        password: &str,
    ) -> PicoResult<Vec<u8>> {
        let server_line = transport.read_identification().await?;
        let ours = Version::new(&self.config.software_version, None);
        transport.write_identification(&ours).await?;
        let client_line = ours.to_string();
        info!(server = %server_line, "Version exchange complete");
        self.status().server_version = Some(server_line.clone());

        let client_kexinit = KexInit::client_default();
        let client_payload = client_kexinit.to_bytes();
        transport.send_packet(&client_payload).await?;

        let server_payload = transport.expect_message(MessageType::KexInit).await?;
        let server_kexinit = KexInit::from_bytes(&server_payload)?;
        let negotiated = negotiate(&client_kexinit, &server_kexinit)?;
        info!(algorithms = %negotiated, "Algorithms negotiated");

        if server_guess_is_wrong(&client_kexinit, &server_kexinit) {
            let guessed = transport.next_message().await?;
            debug!(message_type = guessed[0], "Discarding wrongly guessed KEX packet");
        }

        let method = KexMethod::from_name(negotiated.kex(), self.config.gex)?;
        let ctx = ExchangeContext {
            client_version: &client_line,
            server_version: &server_line,
            client_kexinit: &client_payload,
            server_kexinit: &server_payload,
        };
        let kex = method.run(transport, &ctx).await?;

        let fingerprint = host_key_fingerprint(&kex.host_key);
        let session_id = kex.exchange_hash.clone();

        transport.send_packet(&NewKeys::new().to_bytes()).await?;
        let reply = transport.expect_message(MessageType::NewKeys).await?;
        NewKeys::from_bytes(&reply)?;

        let keys = SessionKeys::derive(
            kex.hash,
            &kex.shared_secret,
            &kex.exchange_hash,
            &session_id,
            &negotiated,
        );
        drop(kex);
        transport.enable_encryption(
            keys.client_to_server(self.config.ctr_backend)?,
            keys.server_to_client(self.config.ctr_backend)?,
        );
        drop(keys);
        info!("NEWKEYS exchanged, transport encrypted");

        {
            let mut status = self.status();
            status.host_key_fingerprint = Some(fingerprint);
            status.negotiated = Some(negotiated);
            status.state = ClientState::Authenticating;
        }

        authenticate_password(transport, username, password).await?;
        Ok(session_id)
    }

    /// Runs a command and appends `$ <command>` and its output to the
    /// transcript.
    ///
    /// Returns false if the command could not be run; an `[Error: ...]` line
    /// is appended instead. Transport failures and framing errors end the
    /// session; a concurrent [`disconnect`](Self::disconnect) abandons the
    /// command.
    pub async fn execute_command(&self, command: &str) -> bool {
        let mut cancel = {
            let mut status = self.status();
            if status.state != ClientState::Connected {
                status.error = Some("Not connected".to_string());
                return false;
            }
            self.cancel.subscribe()
        };

        let mut guard = self.session.lock().await;
        let session = match guard.as_mut() {
            Some(session) if !cancel.has_changed().unwrap_or(true) => session,
            _ => {
                self.status().error = Some("Not connected".to_string());
                return false;
            }
        };

        self.status().output.push(format!("$ {}", command));
        info!(command, "Executing command");

        let params = self.config.channel_params();
        let run = channel::execute(&mut session.transport, command, &params);
        let result = cancellable(&mut cancel, run).await;
        match result {
            Ok(result) => {
                debug!(
                    lines = result.lines.len(),
                    exit_status = ?result.exit_status,
                    "Command finished"
                );
                self.status().output.extend(result.lines);
                true
            }
            Err(e) => {
                warn!(command, error = %e, "Command failed");
                {
                    let mut status = self.status();
                    status.output.push(format!("[Error: {}]", e));
                    status.error = Some(e.to_string());
                }
                if matches!(e, PicoError::Cancelled(_)) {
                    return false;
                }

                if e.is_fatal() || session.transport.is_desynchronized() {
                    error!(error = %e, "Session lost");
                    if let Some(mut session) = guard.take() {
                        if let Err(close_err) = session.transport.shutdown().await {
                            debug!(error = %close_err, "Shutdown after failure");
                        }
                    }
                    self.status().state = ClientState::Disconnected;
                }
                false
            }
        }
    }

    /// Sends SSH_MSG_DISCONNECT (best effort) and closes the connection.
    ///
    /// A connect or command in progress is abandoned first, so this never
    /// waits for a read timeout.
    pub async fn disconnect(&self) {
        {
            let mut status = self.status();
            self.cancel
                .send_modify(|generation| *generation = generation.wrapping_add(1));
            status.state = ClientState::Disconnected;
        }

        let mut slot = self.session.lock().await;
        if let Some(mut session) = slot.take() {
            let msg = Disconnect::new(DisconnectReason::ByApplication, DISCONNECT_DESCRIPTION);
            if let Err(e) = session.transport.send_packet(&msg.to_bytes()).await {
                debug!(error = %e, "Failed to send DISCONNECT");
            }
            if let Err(e) = session.transport.shutdown().await {
                debug!(error = %e, "Failed to shut down stream");
            }
        }

        let mut status = self.status();
        if !status.attempt_in_flight {
            status.state = ClientState::Disconnected;
            status.server_version = None;
            status.host_key_fingerprint = None;
            status.negotiated = None;
        }
        drop(slot);
        info!("Disconnected");
    }
}

fn cancelled() -> PicoError {
    PicoError::Cancelled("disconnect requested".to_string())
}

/// Runs `op` until it finishes or the disconnect generation changes.
async fn cancellable<T>(
    cancel: &mut watch::Receiver<u64>,
    op: impl Future<Output = PicoResult<T>>,
) -> PicoResult<T> {
    tokio::select! {
        result = op => result,
        _ = cancel.changed() => Err(cancelled()),
    }
}
