//! Scriptable SSH server for integration tests.
//!
//! Built from the crate's own primitives. It serves exactly one connection
//! on `127.0.0.1:0` and reports what the client did.
//!
//! Commands understood by the exec handler:
//!
//! | Command | Behaviour |
//! |---------|-----------|
//! | `echo hello` | stdout `hello`, exit 0 |
//! | `fail` | stderr `boom`, exit 1 |
//! | `split` | stdout `partial line` / `second`, split across frames |
//! | `deny` | exec rejected with CHANNEL_FAILURE |
//! | `hangup` | the server drops the connection |
//! | `sleep` | exec accepted, then nothing is ever sent |
//! | `garbage` | bytes that do not decrypt to a valid packet |
//! | `stall` | the first bytes of a packet, never the rest |
//! | anything else | stdout `ran: <command>`, exit 0 |

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use num_bigint::BigUint;
use picoware_platform::{PicoError, PicoResult};
use picoware_proto::ssh::auth::{AuthBanner, AuthFailure, AuthRequest, ServiceMessage};
use picoware_proto::ssh::connection::{
    ChannelData, ChannelExtendedData, ChannelNotice, ChannelOpen, ChannelOpenConfirmation,
    ChannelOpenFailure, ChannelRequest, ChannelRequestType,
};
use picoware_proto::ssh::crypto::{CtrBackend, SshHasher};
use picoware_proto::ssh::exchange::{GexRequest, KexMethod};
use picoware_proto::ssh::kex::{negotiate, KexInit, NewKeys, CIPHER_ALGORITHMS, MAC_ALGORITHMS};
use picoware_proto::ssh::kex_dh::{
    group14_generator, group14_prime, Curve25519Exchange, DhExchange, SessionKeys, SharedSecret,
};
use picoware_proto::ssh::message::MessageType;
use picoware_proto::ssh::transport::Transport;
use picoware_proto::ssh::version::Version;
use picoware_proto::ssh::wire::{
    parse_mpint_unsigned, parse_string, parse_uint32, write_bool, write_mpint, write_string,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Identification the mock server sends.
pub const SERVER_VERSION: &str = "SSH-2.0-MockSSH_1.0";

/// Methods offered after a failed password attempt.
pub const OFFERED_METHODS: [&str; 2] = ["publickey", "password"];

/// What the server offers and how it misbehaves.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// KEX algorithms, in server preference order.
    pub kex: Vec<&'static str>,
    /// Ciphers, both directions.
    pub ciphers: Vec<&'static str>,
    /// MACs, both directions.
    pub macs: Vec<&'static str>,
    /// Accepted password.
    pub password: String,
    /// Lines sent before the identification line.
    pub pre_banner: Vec<String>,
    /// USERAUTH_BANNER text sent before the auth result.
    pub banner: Option<String>,
    /// Send IGNORE, DEBUG and GLOBAL_REQUEST messages.
    pub noise: bool,
    /// Number of channel opens to refuse.
    pub reject_channels: usize,
    /// Flip a bit in the MAC of SERVICE_ACCEPT.
    pub corrupt_mac: bool,
    /// Announce a KEX guess and send a bogus guessed packet.
    pub wrong_guess: bool,
    /// Pause before sending anything.
    pub banner_delay: Option<Duration>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            kex: vec![
                "curve25519-sha256",
                "diffie-hellman-group-exchange-sha256",
                "diffie-hellman-group14-sha256",
                "diffie-hellman-group14-sha1",
            ],
            ciphers: CIPHER_ALGORITHMS.to_vec(),
            macs: MAC_ALGORITHMS.to_vec(),
            password: "pass".to_string(),
            pre_banner: Vec::new(),
            banner: None,
            noise: false,
            reject_channels: 0,
            corrupt_mac: false,
            wrong_guess: false,
            banner_delay: None,
        }
    }
}

/// What the client did during the connection.
#[derive(Debug, Default)]
pub struct ServerReport {
    /// Client identification line.
    pub client_version: String,
    /// Negotiated KEX method.
    pub kex: String,
    /// Negotiated client-to-server cipher.
    pub cipher: String,
    /// Negotiated client-to-server MAC.
    pub mac: String,
    /// User name from the password request.
    pub user: String,
    /// Commands received in exec requests.
    pub commands: Vec<String>,
    /// Reason code and description of the client's DISCONNECT.
    pub disconnect: Option<(u32, String)>,
    /// Whether the client answered a GLOBAL_REQUEST with REQUEST_FAILURE.
    pub request_failure_seen: bool,
    /// Error that ended the server side, if not a clean disconnect.
    pub error: Option<String>,
}

/// Starts the server and returns its address and a handle yielding the
/// report once the connection ends.
pub async fn spawn(options: MockOptions) -> (SocketAddr, JoinHandle<ServerReport>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut report = ServerReport::default();
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = Transport::new(stream, Duration::from_secs(30));

        match serve(&mut transport, &options, &mut report).await {
            Ok(()) => {}
            Err(PicoError::Disconnected {
                reason_code,
                description,
            }) => report.disconnect = Some((reason_code, description)),
            Err(e) => report.error = Some(e.to_string()),
        }
        report
    });

    (addr, handle)
}

/// Host key blob sent in every KEX reply. The signature is never checked.
pub fn host_key_blob() -> Vec<u8> {
    let mut blob = BytesMut::new();
    write_string(&mut blob, b"ssh-ed25519");
    write_string(&mut blob, &[0x42; 32]);
    blob.to_vec()
}

async fn recv(transport: &mut Transport, report: &mut ServerReport) -> PicoResult<Vec<u8>> {
    loop {
        let payload = transport.next_message().await?;
        if payload[0] == MessageType::RequestFailure as u8 {
            report.request_failure_seen = true;
            continue;
        }
        return Ok(payload);
    }
}

async fn send_noise(transport: &mut Transport, global_request: bool) -> PicoResult<()> {
    transport.send_packet(&[2, 0, 0, 0, 3, b'p', b'a', b'd']).await?;

    let mut debug = BytesMut::new();
    debug.put_u8(4);
    write_bool(&mut debug, false);
    write_string(&mut debug, b"mock server debug message");
    write_string(&mut debug, b"");
    transport.send_packet(&debug).await?;

    if global_request {
        let mut global = BytesMut::new();
        global.put_u8(80);
        write_string(&mut global, b"hostkeys-00@openssh.com");
        write_bool(&mut global, true);
        transport.send_packet(&global).await?;

        let mut quiet = BytesMut::new();
        quiet.put_u8(80);
        write_string(&mut quiet, b"no-reply@example.com");
        write_bool(&mut quiet, false);
        transport.send_packet(&quiet).await?;
    }
    Ok(())
}

async fn serve(
    transport: &mut Transport,
    options: &MockOptions,
    report: &mut ServerReport,
) -> PicoResult<()> {
    if let Some(delay) = options.banner_delay {
        tokio::time::sleep(delay).await;
    }
    for line in &options.pre_banner {
        transport.write_raw(format!("{}\r\n", line).as_bytes()).await?;
    }
    transport
        .write_identification(&Version::new("MockSSH_1.0", None))
        .await?;
    let client_version = transport.read_identification().await?;
    report.client_version = client_version.clone();

    if options.noise {
        send_noise(transport, false).await?;
    }

    let mut server_kexinit = KexInit::with_algorithms(
        &options.kex,
        &["ssh-ed25519"],
        &options.ciphers,
        &options.macs,
    );
    server_kexinit.set_first_kex_packet_follows(options.wrong_guess);
    let server_payload = server_kexinit.to_bytes();
    transport.send_packet(&server_payload).await?;
    if options.wrong_guess {
        transport.send_packet(&[31, 0, 0, 0, 0]).await?;
    }

    let client_payload = transport.expect_message(MessageType::KexInit).await?;
    let client_kexinit = KexInit::from_bytes(&client_payload)?;
    let negotiated = negotiate(&client_kexinit, &server_kexinit)?;
    report.kex = negotiated.kex().to_string();
    report.cipher = negotiated.cipher_client_to_server().name().to_string();
    report.mac = negotiated.mac_client_to_server().name().to_string();

    let method = KexMethod::from_name(negotiated.kex(), GexRequest::default())?;
    let hash = method.hash_algorithm();
    let host_key = host_key_blob();

    let mut hasher = SshHasher::new(hash);
    hasher
        .string(client_version.as_bytes())
        .string(SERVER_VERSION.as_bytes())
        .string(&client_payload)
        .string(&server_payload)
        .string(&host_key);

    let shared_secret: SharedSecret = match method {
        KexMethod::Curve25519Sha256 => {
            let init = transport.expect_message(MessageType::KexdhInit).await?;
            let (client_public, _) = parse_string(&init, 1)?;
            let exchange = Curve25519Exchange::new();
            let secret = exchange.compute_shared_secret(&client_public)?;

            hasher
                .string(&client_public)
                .string(exchange.public_key())
                .update(&secret.to_mpint());

            let mut reply = BytesMut::new();
            reply.put_u8(31);
            write_string(&mut reply, &host_key);
            write_string(&mut reply, exchange.public_key());
            write_string(&mut reply, b"unsigned");
            transport.send_packet(&reply).await?;
            secret
        }
        KexMethod::DhGroup14(_) => {
            let init = transport.expect_message(MessageType::KexdhInit).await?;
            let (e, _) = parse_mpint_unsigned(&init, 1)?;
            let dh = DhExchange::group14();
            let secret = dh.compute_shared_secret(&e)?;

            hasher
                .mpint(&e)
                .mpint(dh.public_key())
                .update(&secret.to_mpint());

            let mut reply = BytesMut::new();
            reply.put_u8(31);
            write_string(&mut reply, &host_key);
            write_mpint(&mut reply, dh.public_key());
            write_string(&mut reply, b"unsigned");
            transport.send_packet(&reply).await?;
            secret
        }
        KexMethod::DhGroupExchangeSha256(_) => {
            let request = transport
                .expect_message(MessageType::KexDhGexRequest)
                .await?;
            let (min, offset) = parse_uint32(&request, 1)?;
            let (preferred, offset) = parse_uint32(&request, offset)?;
            let (max, _) = parse_uint32(&request, offset)?;

            let p: BigUint = group14_prime().clone();
            let g = group14_generator();
            let mut group = BytesMut::new();
            group.put_u8(31);
            write_mpint(&mut group, &p);
            write_mpint(&mut group, &g);
            transport.send_packet(&group).await?;

            let init = transport.expect_message(MessageType::KexDhGexInit).await?;
            let (e, _) = parse_mpint_unsigned(&init, 1)?;
            let dh = DhExchange::new(p, g)?;
            let secret = dh.compute_shared_secret(&e)?;

            hasher
                .uint32(min)
                .uint32(preferred)
                .uint32(max)
                .mpint(dh.prime())
                .mpint(dh.generator())
                .mpint(&e)
                .mpint(dh.public_key())
                .update(&secret.to_mpint());

            let mut reply = BytesMut::new();
            reply.put_u8(33);
            write_string(&mut reply, &host_key);
            write_mpint(&mut reply, dh.public_key());
            write_string(&mut reply, b"unsigned");
            transport.send_packet(&reply).await?;
            secret
        }
    };
    let exchange_hash = hasher.finish();

    transport.send_packet(&NewKeys::new().to_bytes()).await?;
    transport.expect_message(MessageType::NewKeys).await?;
    let keys = SessionKeys::derive(
        hash,
        &shared_secret,
        &exchange_hash,
        &exchange_hash,
        &negotiated,
    );
    transport.enable_encryption(
        keys.server_to_client(CtrBackend::Native)?,
        keys.client_to_server(CtrBackend::Native)?,
    );

    let request = ServiceMessage::from_bytes(&recv(transport, report).await?)?;
    let accept = ServiceMessage::accept(request.service_name()).to_bytes();
    if options.corrupt_mac {
        let mut bytes = transport.encode_packet(&accept)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        transport.write_raw(&bytes).await?;
        // The client must give up; wait for it to hang up.
        return recv(transport, report).await.map(|_| ());
    }
    transport.send_packet(&accept).await?;

    if options.noise {
        send_noise(transport, true).await?;
    }

    loop {
        let auth = AuthRequest::from_bytes(&recv(transport, report).await?)?;
        report.user = auth.user_name().to_string();

        if let Some(banner) = &options.banner {
            transport
                .send_packet(&AuthBanner::new(banner).to_bytes())
                .await?;
        }

        if auth.secret() == options.password {
            transport
                .send_packet(&[MessageType::UserauthSuccess as u8])
                .await?;
            break;
        }
        let methods = OFFERED_METHODS.iter().map(|m| m.to_string()).collect();
        transport
            .send_packet(&AuthFailure::new(methods, false).to_bytes())
            .await?;
    }

    let mut rejected = 0;
    let mut next_remote_id = 100;
    loop {
        let payload = recv(transport, report).await?;
        match MessageType::of(&payload) {
            Some(MessageType::ChannelOpen) => {
                let open = ChannelOpen::from_bytes(&payload)?;
                if rejected < options.reject_channels {
                    rejected += 1;
                    let failure = ChannelOpenFailure::new(
                        open.sender_channel(),
                        ChannelOpenFailure::ADMINISTRATIVELY_PROHIBITED,
                        "channel refused by policy",
                    );
                    transport.send_packet(&failure.to_bytes()).await?;
                    continue;
                }
                if options.noise {
                    send_noise(transport, true).await?;
                }
                let confirm = ChannelOpenConfirmation::new(
                    open.sender_channel(),
                    next_remote_id,
                    1 << 20,
                    32768,
                );
                next_remote_id += 1;
                transport.send_packet(&confirm.to_bytes()).await?;
            }
            Some(MessageType::ChannelRequest) => {
                let request = ChannelRequest::from_bytes(&payload)?;
                if let ChannelRequestType::Exec { command } = request.request_type() {
                    report.commands.push(command.clone());
                    if command == "hangup" {
                        return Ok(());
                    }
                    run_command(transport, command).await?;
                }
            }
            Some(MessageType::ChannelClose) | Some(MessageType::ChannelEof) => {}
            _ => {
                return Err(PicoError::Protocol(format!(
                    "mock server: unexpected message {}",
                    payload[0]
                )))
            }
        }
    }
}

async fn run_command(transport: &mut Transport, command: &str) -> PicoResult<()> {
    // The client always uses local channel 0.
    let channel = 0;

    if command == "deny" {
        transport
            .send_packet(&ChannelNotice::failure(channel).to_bytes())
            .await?;
        return transport
            .send_packet(&ChannelNotice::close(channel).to_bytes())
            .await;
    }

    transport
        .send_packet(&ChannelNotice::success(channel).to_bytes())
        .await?;

    match command {
        "sleep" => return Ok(()),
        "garbage" => return transport.write_raw(&[0xa5; 64]).await,
        "stall" => {
            let data = ChannelData::new(channel, b"never finished".to_vec());
            let packet = transport.encode_packet(&data.to_bytes())?;
            return transport.write_raw(&packet[..10]).await;
        }
        _ => {}
    }

    let exit_status = match command {
        "echo hello" => {
            send_stdout(transport, channel, b"hello\n").await?;
            0
        }
        "fail" => {
            let data = ChannelExtendedData::stderr(channel, b"boom\n".to_vec());
            transport.send_packet(&data.to_bytes()).await?;
            1
        }
        "split" => {
            send_stdout(transport, channel, b"par").await?;
            send_stdout(transport, channel, b"tial line\r\nsec").await?;
            send_stdout(transport, channel, b"ond\n\n").await?;
            0
        }
        other => {
            send_stdout(transport, channel, format!("ran: {}\n", other).as_bytes()).await?;
            0
        }
    };

    let status = ChannelRequest::new(
        channel,
        ChannelRequestType::ExitStatus { exit_status },
        false,
    );
    transport.send_packet(&status.to_bytes()).await?;
    transport
        .send_packet(&ChannelNotice::eof(channel).to_bytes())
        .await?;
    transport
        .send_packet(&ChannelNotice::close(channel).to_bytes())
        .await
}

async fn send_stdout(transport: &mut Transport, channel: u32, data: &[u8]) -> PicoResult<()> {
    transport
        .send_packet(&ChannelData::new(channel, data.to_vec()).to_bytes())
        .await
}

