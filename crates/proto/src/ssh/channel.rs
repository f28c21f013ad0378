//! Session channel running a single command.
//!
//! One channel exists at a time and always uses local id 0. A fresh channel
//! is opened per command:
//!
//! ```text
//! C: CHANNEL_OPEN "session"          S: OPEN_CONFIRMATION | OPEN_FAILURE
//! C: CHANNEL_REQUEST "exec" (reply)  S: SUCCESS | FAILURE
//!                                    S: DATA / EXTENDED_DATA / WINDOW_ADJUST ...
//!                                    S: REQUEST "exit-status", EOF, CLOSE
//! C: CHANNEL_CLOSE
//! ```
//!
//! If no packet starts within the read timeout while collecting output, the
//! command ends quietly; it is not an error. A packet that starts but does
//! not finish in time is a transport failure.

use picoware_platform::{PicoError, PicoResult};
use tracing::{debug, info, warn};

use super::connection::{
    ChannelData, ChannelExtendedData, ChannelNotice, ChannelOpen, ChannelOpenConfirmation,
    ChannelOpenFailure, ChannelRequest, ChannelRequestType, ChannelWindowAdjust,
};
use super::message::MessageType;
use super::output::OutputBuffer;
use super::transport::Transport;

/// Local channel number. Only one channel is ever open.
pub const LOCAL_CHANNEL_ID: u32 = 0;

/// Line added when the server refuses the exec request.
pub const EXEC_REJECTED_LINE: &str = "[exec request rejected by server]";

/// Window and packet limits we advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    /// Initial receive window.
    pub window_size: u32,
    /// Largest data packet we accept.
    pub max_packet_size: u32,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            window_size: 2 * 1024 * 1024,
            max_packet_size: 32 * 1024,
        }
    }
}

/// SSH Channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel is open and ready
    Open,
    /// Peer sent EOF; more requests or CLOSE may follow
    Eof,
    /// Channel is closed
    Closed,
}

/// Output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// stdout and `[stderr] `-prefixed stderr lines, in arrival order.
    pub lines: Vec<String>,
    /// Exit status, if the server reported one.
    pub exit_status: Option<u32>,
}

/// An open session channel.
#[derive(Debug)]
pub struct SshChannel {
    local_id: u32,
    remote_id: u32,
    state: ChannelState,
    remote_window: u32,
    remote_max_packet: u32,
    local_window: u32,
    initial_local_window: u32,
    close_sent: bool,
}

impl SshChannel {
    /// Opens a session channel and waits for the server's answer.
    ///
    /// # Errors
    ///
    /// [`PicoError::Channel`] with the server's text on OPEN_FAILURE.
    pub async fn open(transport: &mut Transport, params: &ChannelParams) -> PicoResult<Self> {
        let open = ChannelOpen::session(LOCAL_CHANNEL_ID, params.window_size, params.max_packet_size);
        transport.send_packet(&open.to_bytes()).await?;

        loop {
            let payload = transport.next_message().await?;
            match MessageType::of(&payload) {
                Some(MessageType::ChannelOpenConfirmation) => {
                    let confirm = ChannelOpenConfirmation::from_bytes(&payload)?;
                    if confirm.recipient_channel() != LOCAL_CHANNEL_ID {
                        return Err(PicoError::Protocol(format!(
                            "Channel confirmation for unknown channel {}",
                            confirm.recipient_channel()
                        )));
                    }
                    debug!(
                        remote_id = confirm.sender_channel(),
                        remote_window = confirm.initial_window_size(),
                        remote_max_packet = confirm.maximum_packet_size(),
                        "Channel opened"
                    );
                    return Ok(Self {
                        local_id: LOCAL_CHANNEL_ID,
                        remote_id: confirm.sender_channel(),
                        state: ChannelState::Open,
                        remote_window: confirm.initial_window_size(),
                        remote_max_packet: confirm.maximum_packet_size(),
                        local_window: params.window_size,
                        initial_local_window: params.window_size,
                        close_sent: false,
                    });
                }
                Some(MessageType::ChannelOpenFailure) => {
                    let failure = ChannelOpenFailure::from_bytes(&payload)?;
                    warn!(
                        reason = failure.reason_code(),
                        description = failure.description(),
                        "Channel open rejected"
                    );
                    return Err(failure.into());
                }
                Some(MessageType::ChannelWindowAdjust) => {
                    debug!("Ignoring window adjust while opening channel");
                }
                // Leftovers from a previous channel that was abandoned on
                // timeout.
                Some(
                    MessageType::ChannelData
                    | MessageType::ChannelExtendedData
                    | MessageType::ChannelEof
                    | MessageType::ChannelClose
                    | MessageType::ChannelRequest
                    | MessageType::ChannelSuccess
                    | MessageType::ChannelFailure,
                ) => {
                    debug!(message_type = payload[0], "Ignoring stale channel message");
                }
                _ => {
                    return Err(PicoError::Protocol(format!(
                        "Unexpected message while opening channel: type {}",
                        payload[0]
                    )))
                }
            }
        }
    }

    /// Returns the local channel ID.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Returns the remote channel ID.
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Returns the window the peer has granted us.
    pub fn remote_window(&self) -> u32 {
        self.remote_window
    }

    /// Returns the peer's maximum packet size.
    pub fn remote_max_packet(&self) -> u32 {
        self.remote_max_packet
    }

    /// Returns how much data the peer may still send before we adjust.
    pub fn local_window(&self) -> u32 {
        self.local_window
    }

    /// Sends an `exec` request with want-reply set.
    pub async fn exec(&mut self, transport: &mut Transport, command: &str) -> PicoResult<()> {
        let request = ChannelRequest::new(
            self.remote_id,
            ChannelRequestType::Exec {
                command: command.to_string(),
            },
            true,
        );
        debug!(command, "Requesting exec");
        transport.send_packet(&request.to_bytes()).await
    }

    /// Charges received data against our window, topping it back up once it
    /// falls below half.
    async fn consume_local_window(&mut self, transport: &mut Transport, len: usize) -> PicoResult<()> {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        if len > self.local_window {
            warn!(
                len,
                window = self.local_window,
                "Peer sent more data than the window allows"
            );
        }
        self.local_window = self.local_window.saturating_sub(len);

        if self.local_window < self.initial_local_window / 2 {
            let bytes_to_add = self.initial_local_window - self.local_window;
            let adjust = ChannelWindowAdjust::new(self.remote_id, bytes_to_add);
            transport.send_packet(&adjust.to_bytes()).await?;
            self.local_window = self.initial_local_window;
            debug!(bytes_to_add, "Replenished local window");
        }
        Ok(())
    }

    /// Sends CHANNEL_CLOSE once.
    async fn send_close(&mut self, transport: &mut Transport) -> PicoResult<()> {
        if !self.close_sent {
            self.close_sent = true;
            transport
                .send_packet(&ChannelNotice::close(self.remote_id).to_bytes())
                .await?;
        }
        Ok(())
    }

    /// Reads until the peer closes the channel or goes quiet for a read timeout.
    pub async fn collect(&mut self, transport: &mut Transport) -> PicoResult<ExecOutput> {
        let mut output = OutputBuffer::new();
        let mut exit_status = None;

        loop {
            let payload = match transport.next_message().await {
                Ok(payload) => payload,
                Err(e) if e.is_timeout() => {
                    debug!("No output within read timeout, ending command");
                    self.send_close(transport).await?;
                    break;
                }
                Err(e) => return Err(e),
            };

            match MessageType::of(&payload) {
                Some(MessageType::ChannelSuccess) => {
                    debug!("Exec request accepted");
                }
                Some(MessageType::ChannelFailure) => {
                    warn!("Exec request rejected");
                    output.push_line(EXEC_REJECTED_LINE);
                }
                Some(MessageType::ChannelData) => {
                    let data = ChannelData::from_bytes(&payload)?;
                    self.consume_local_window(transport, data.data().len()).await?;
                    output.push_stdout(data.data());
                }
                Some(MessageType::ChannelExtendedData) => {
                    let data = ChannelExtendedData::from_bytes(&payload)?;
                    self.consume_local_window(transport, data.data().len()).await?;
                    if data.is_stderr() {
                        output.push_stderr(data.data());
                    } else {
                        debug!(code = data.data_type_code(), "Dropping extended data");
                    }
                }
                Some(MessageType::ChannelEof) => {
                    debug!("Channel EOF");
                    self.state = ChannelState::Eof;
                }
                Some(MessageType::ChannelWindowAdjust) => {
                    let adjust = ChannelWindowAdjust::from_bytes(&payload)?;
                    self.remote_window = self.remote_window.saturating_add(adjust.bytes_to_add());
                }
                Some(MessageType::ChannelRequest) => {
                    let request = ChannelRequest::from_bytes(&payload)?;
                    match request.request_type() {
                        ChannelRequestType::ExitStatus { exit_status: status } => {
                            info!(exit_status = status, "Command exited");
                            exit_status = Some(*status);
                        }
                        other => debug!(request = other.name(), "Channel request from server"),
                    }
                    if request.want_reply() {
                        transport
                            .send_packet(&ChannelNotice::success(self.remote_id).to_bytes())
                            .await?;
                    }
                }
                Some(MessageType::ChannelClose) => {
                    debug!("Channel closed by server");
                    self.send_close(transport).await?;
                    self.state = ChannelState::Closed;
                    break;
                }
                _ => {
                    debug!(message_type = payload[0], "Ignoring unexpected message during exec");
                }
            }
        }

        Ok(ExecOutput {
            lines: output.finish(),
            exit_status,
        })
    }
}

/// Opens a channel, runs `command` and collects its output.
pub async fn execute(
    transport: &mut Transport,
    command: &str,
    params: &ChannelParams,
) -> PicoResult<ExecOutput> {
    let mut channel = SshChannel::open(transport, params).await?;
    channel.exec(transport, command).await?;
    channel.collect(transport).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pair(client_timeout: Duration) -> (Transport, Transport) {
        let (a, b) = tokio::io::duplex(256 * 1024);
        (
            Transport::new(a, client_timeout),
            Transport::new(b, Duration::from_secs(60)),
        )
    }

    async fn accept_open(server: &mut Transport, remote_id: u32) {
        let open = ChannelOpen::from_bytes(&server.next_message().await.unwrap()).unwrap();
        assert_eq!(open.channel_type(), "session");
        let confirm = ChannelOpenConfirmation::new(open.sender_channel(), remote_id, 1 << 20, 32768);
        server.send_packet(&confirm.to_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_collects_output_and_exit_status() {
        let (mut client, mut server) = pair(Duration::from_secs(5));

        let peer = tokio::spawn(async move {
            server.send_packet(&ChannelWindowAdjust::new(0, 10).to_bytes()).await.unwrap();
            accept_open(&mut server, 7).await;

            let exec = ChannelRequest::from_bytes(&server.next_message().await.unwrap()).unwrap();
            assert_eq!(exec.recipient_channel(), 7);
            assert!(exec.want_reply());

            server.send_packet(&ChannelNotice::success(0).to_bytes()).await.unwrap();
            server.send_packet(&ChannelData::new(0, b"hel".to_vec()).to_bytes()).await.unwrap();
            server.send_packet(&ChannelData::new(0, b"lo\n".to_vec()).to_bytes()).await.unwrap();
            server
                .send_packet(&ChannelExtendedData::stderr(0, b"warn\n".to_vec()).to_bytes())
                .await
                .unwrap();
            server.send_packet(&ChannelWindowAdjust::new(0, 100).to_bytes()).await.unwrap();
            let status = ChannelRequest::new(0, ChannelRequestType::ExitStatus { exit_status: 3 }, true);
            server.send_packet(&status.to_bytes()).await.unwrap();
            server.send_packet(&ChannelNotice::eof(0).to_bytes()).await.unwrap();
            server.send_packet(&ChannelNotice::close(0).to_bytes()).await.unwrap();

            let reply = ChannelNotice::from_bytes(&server.next_message().await.unwrap()).unwrap();
            assert_eq!(reply.kind(), MessageType::ChannelSuccess);
            let close = ChannelNotice::from_bytes(&server.next_message().await.unwrap()).unwrap();
            assert_eq!(close.kind(), MessageType::ChannelClose);
            assert_eq!(close.recipient_channel(), 7);
        });

        let output = execute(&mut client, "do-it", &ChannelParams::default())
            .await
            .unwrap();
        peer.await.unwrap();

        assert_eq!(output.lines, vec!["hello", "[stderr] warn"]);
        assert_eq!(output.exit_status, Some(3));
    }

    #[tokio::test]
    async fn test_open_failure_is_channel_error() {
        let (mut client, mut server) = pair(Duration::from_secs(5));

        tokio::spawn(async move {
            let _ = server.next_message().await;
            let failure = ChannelOpenFailure::new(0, ChannelOpenFailure::RESOURCE_SHORTAGE, "too many");
            let _ = server.send_packet(&failure.to_bytes()).await;
        });

        match execute(&mut client, "ls", &ChannelParams::default()).await {
            Err(PicoError::Channel(msg)) => assert!(msg.contains("too many")),
            other => panic!("Expected Channel error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_failure_adds_line_and_continues() {
        let (mut client, mut server) = pair(Duration::from_secs(5));

        tokio::spawn(async move {
            accept_open(&mut server, 1).await;
            let _ = server.next_message().await;
            let _ = server.send_packet(&ChannelNotice::failure(0).to_bytes()).await;
            let _ = server.send_packet(&ChannelNotice::close(0).to_bytes()).await;
            let _ = server.next_message().await;
        });

        let output = execute(&mut client, "forbidden", &ChannelParams::default())
            .await
            .unwrap();
        assert_eq!(output.lines, vec![EXEC_REJECTED_LINE]);
        assert_eq!(output.exit_status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_collection_quietly() {
        let (mut client, mut server) = pair(Duration::from_secs(15));

        let peer = tokio::spawn(async move {
            accept_open(&mut server, 1).await;
            let _ = server.next_message().await;
            server
                .send_packet(&ChannelData::new(0, b"partial".to_vec()).to_bytes())
                .await
                .unwrap();
            // Never closes; the client gives up and closes instead.
            let close = ChannelNotice::from_bytes(&server.next_message().await.unwrap()).unwrap();
            assert_eq!(close.kind(), MessageType::ChannelClose);
            server
        });

        let output = execute(&mut client, "sleep 100", &ChannelParams::default())
            .await
            .unwrap();
        assert_eq!(output.lines, vec!["partial"]);
        drop(peer.await.unwrap());
    }

    #[tokio::test]
    async fn test_local_window_replenished() {
        let (mut client, mut server) = pair(Duration::from_secs(5));
        let params = ChannelParams {
            window_size: 1000,
            max_packet_size: 600,
        };

        let peer = tokio::spawn(async move {
            accept_open(&mut server, 9).await;
            let _ = server.next_message().await;
            server
                .send_packet(&ChannelData::new(0, vec![b'a'; 600]).to_bytes())
                .await
                .unwrap();

            let adjust =
                ChannelWindowAdjust::from_bytes(&server.next_message().await.unwrap()).unwrap();
            server.send_packet(&ChannelNotice::close(0).to_bytes()).await.unwrap();
            let _ = server.next_message().await;
            adjust
        });

        let output = execute(&mut client, "yes", &params).await.unwrap();
        let adjust = peer.await.unwrap();

        assert_eq!(adjust.recipient_channel(), 9);
        assert_eq!(adjust.bytes_to_add(), 600);
        assert_eq!(output.lines, vec!["a".repeat(600)]);
    }
}
