//! Connection handling logic for realm and instance sockets.
//!
//! This module contains the core connection handling logic that manages
//! the lifecycle of individual sockets: authentication, frame splitting,
//! socket-level opcodes, dispatch of everything else to the world runner,
//! and cleanup.

use crate::config::ServerConfig;
use crate::connection::{AccountInfo, Session, SessionManager};
use crate::error::ServerError;
use crate::handlers::WorldTable;
use crate::security::SecurityManager;
use crate::world::WorldCommand;
use realm_protocol::packets::{AuthContinuedSession, AuthResponse, AuthResult, AuthSession, Ping, Pong, ResumeComms};
use realm_protocol::{
    cmsg, decode_payload, encode_packet, ConnectionType, EncodedFrame, Frame, Locale, Localized, ProtocolError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use world_sim::ShutdownState;

/// How long a writer may keep flushing after its socket's session ended.
const WRITER_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 4096;

/// Everything a connection task needs, cheap to clone per socket.
#[derive(Clone)]
pub struct ConnectionContext {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionManager>,
    pub security: Arc<SecurityManager>,
    pub table: Arc<WorldTable>,
    pub world: mpsc::Sender<WorldCommand>,
    pub motd: Arc<Localized<String>>,
    pub shutdown_state: ShutdownState,
}

/// Handles a single socket from accept to cleanup.
///
/// The first frame decides what the socket is: `CMSG_AUTH_SESSION` opens a
/// new session on a realm socket, `CMSG_AUTH_CONTINUED_SESSION` attaches an
/// instance socket to an existing session. Anything else is refused.
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `ctx` - Shared server state
///
/// # Message Handling
///
/// The function runs two concurrent tasks per socket:
///
/// * **Reader**: Splits frames, answers socket-level opcodes and queues
///   decoded jobs for the world runner
/// * **Writer**: Writes frames handed to the socket's slot in order
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: ConnectionContext) -> Result<(), ServerError> {
    ctx.security
        .validate_connection(addr.ip())
        .await
        .map_err(|e| ServerError::Network(e.to_string()))?;

    let result = serve_socket(stream, addr, &ctx).await;
    ctx.security.on_disconnect(addr.ip()).await;
    result
}

async fn serve_socket(stream: TcpStream, addr: SocketAddr, ctx: &ConnectionContext) -> Result<(), ServerError> {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let mut inbound = Vec::with_capacity(READ_CHUNK);

    let Some(first) = read_frame(&mut reader, &mut inbound, ctx).await? else {
        trace!("Socket from {} closed before authenticating", addr);
        return Ok(());
    };

    match first.opcode {
        cmsg::AUTH_SESSION => {
            let auth: AuthSession = decode_payload(&first.payload).map_err(protocol_error)?;
            realm_connection(reader, writer, inbound, addr, auth, ctx).await
        }
        cmsg::AUTH_CONTINUED_SESSION => {
            let request: AuthContinuedSession = decode_payload(&first.payload).map_err(protocol_error)?;
            instance_connection(reader, writer, inbound, addr, request, ctx).await
        }
        other => Err(ServerError::Network(format!(
            "{addr} sent {other} before authenticating"
        ))),
    }
}

async fn realm_connection(
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    inbound: Vec<u8>,
    addr: SocketAddr,
    auth: AuthSession,
    ctx: &ConnectionContext,
) -> Result<(), ServerError> {
    let locale = Locale::from_tag(auth.locale.trim()).unwrap_or_default();
    let (sender, receiver) = mpsc::channel(ctx.config.outbound_queue_limit.max(1));
    let mut writer_task = tokio::spawn(write_frames(writer, receiver));

    if ctx.shutdown_state.is_shutdown_initiated() || ctx.sessions.len() >= ctx.config.max_connections {
        warn!("🚫 Refusing {} from {}: server full", auth.account_name, addr);
        let refusal = encode_packet(&AuthResponse {
            result: AuthResult::ServerFull,
            queue_position: None,
            motd: String::new(),
        })
        .map_err(protocol_error)?;
        let _ = sender.send(refusal).await;
        drop(sender);
        finish_writer(&mut writer_task).await;
        return Ok(());
    }

    let session = ctx.sessions.create_session(
        AccountInfo {
            account_id: auth.account_id,
            account_name: auth.account_name,
            build: auth.build,
            locale,
        },
        addr,
    );
    let id = session.id();
    let attached = session
        .attach(ConnectionType::Realm, sender)
        .map_err(|e| ServerError::Internal(e.to_string()));

    let result = match attached {
        Ok(_) => {
            let welcome = encode_packet(&AuthResponse {
                result: AuthResult::Ok,
                queue_position: None,
                motd: ctx.motd.get(locale).clone(),
            })
            .map_err(protocol_error)?;
            match ctx.sessions.send(id, welcome) {
                Ok(()) => read_loop(reader, inbound, ConnectionType::Realm, &session, &mut writer_task, ctx).await,
                Err(e) => Err(ServerError::Internal(e.to_string())),
            }
        }
        Err(e) => Err(e),
    };

    // The realm socket is the session: tear it down and let the world
    // forget the character.
    ctx.sessions.remove(id);
    if ctx.world.send(WorldCommand::Disconnect { session: id }).await.is_err() {
        debug!(session = %id, "World runner already stopped");
    }
    finish_writer(&mut writer_task).await;
    info!("🔌 {} disconnected ({})", id, addr);
    result
}

async fn instance_connection(
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    inbound: Vec<u8>,
    addr: SocketAddr,
    request: AuthContinuedSession,
    ctx: &ConnectionContext,
) -> Result<(), ServerError> {
    let Some(session) = ctx.sessions.redeem_connect_key(request.key, request.serial) else {
        return Err(ServerError::Network(format!("{addr} presented an unknown connect key")));
    };
    let id = session.id();

    // One extra slot for the resume packet ahead of the flushed queue.
    let (sender, receiver) = mpsc::channel(session.queue_limit() + 1);
    let mut writer_task = tokio::spawn(write_frames(writer, receiver));
    let resume = encode_packet(&ResumeComms).map_err(protocol_error)?;
    if sender.try_send(resume).is_err() {
        finish_writer(&mut writer_task).await;
        return Err(ServerError::Internal("instance writer stopped before resume".to_string()));
    }

    let weak = sender.downgrade();
    let result = match session.attach(ConnectionType::Instance, sender) {
        Ok(flushed) => {
            info!("🔀 {} instance connection from {}, {} queued frame(s) flushed", id, addr, flushed);
            read_loop(reader, inbound, ConnectionType::Instance, &session, &mut writer_task, ctx).await
        }
        Err(e) => {
            session.close();
            Err(ServerError::Internal(e.to_string()))
        }
    };

    session.detach_sender(ConnectionType::Instance, &weak);
    finish_writer(&mut writer_task).await;
    debug!(session = %id, "Instance connection closed");
    result
}

/// Reads frames until the peer leaves, the session closes, the writer dies
/// or shutdown begins.
async fn read_loop(
    mut reader: OwnedReadHalf,
    mut inbound: Vec<u8>,
    connection: ConnectionType,
    session: &Arc<Session>,
    writer_task: &mut JoinHandle<()>,
    ctx: &ConnectionContext,
) -> Result<(), ServerError> {
    let id = session.id();
    let ip = session.remote_addr().ip();
    let mut closed = session.closed_signal();

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, &mut inbound, ctx) => frame?,
            _ = closed.wait_for(|closed| *closed) => {
                debug!(session = %id, %connection, "Session closed, stopping reader");
                break;
            }
            _ = &mut *writer_task => {
                debug!(session = %id, %connection, "Writer finished, stopping reader");
                break;
            }
            _ = shutdown_initiated(&ctx.shutdown_state) => break,
        };
        let Some(frame) = frame else {
            debug!(session = %id, %connection, "🔌 Client closed the connection");
            break;
        };

        if let Err(e) = ctx.security.validate_packet(ip).await {
            warn!(session = %id, opcode = %frame.opcode, "Packet dropped: {}", e);
            continue;
        }

        match frame.opcode {
            cmsg::PING => {
                let ping: Ping = decode_payload(&frame.payload).map_err(protocol_error)?;
                let mut pong = encode_packet(&Pong { serial: ping.serial }).map_err(protocol_error)?;
                // Answer on whichever socket asked.
                pong.connection = connection;
                if ctx.sessions.send(id, pong).is_err() {
                    break;
                }
            }
            cmsg::KEEP_ALIVE => trace!(session = %id, %connection, "Keep-alive"),
            cmsg::AUTH_SESSION | cmsg::AUTH_CONTINUED_SESSION => {
                warn!(session = %id, opcode = %frame.opcode, "Repeated authentication ignored");
            }
            opcode => match ctx.table.decode(frame, connection, id) {
                Ok(job) => {
                    let command = WorldCommand::Packet { session: id, opcode, job };
                    if ctx.world.send(command).await.is_err() {
                        return Err(ServerError::Internal("world runner stopped".to_string()));
                    }
                }
                Err(e) if e.is_fatal() => {
                    return Err(ServerError::Network(format!("{id} sent a malformed {opcode}: {e}")));
                }
                Err(e) => debug!(session = %id, "Frame dropped: {}", e),
            },
        }
    }
    Ok(())
}

/// Splits the next complete frame off `inbound`, reading more bytes as
/// needed.
///
/// # Returns
///
/// `Ok(None)` when the peer closed the socket. The idle timeout and
/// oversized frames are errors.
async fn read_frame(
    reader: &mut OwnedReadHalf,
    inbound: &mut Vec<u8>,
    ctx: &ConnectionContext,
) -> Result<Option<Frame>, ServerError> {
    let idle = Duration::from_secs(ctx.config.connection_timeout.max(1));
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some((frame, used)) = Frame::split(inbound, ctx.config.max_frame_size).map_err(protocol_error)? {
            inbound.drain(..used);
            return Ok(Some(frame));
        }
        let read = timeout(idle, reader.read(&mut chunk))
            .await
            .map_err(|_| ServerError::Network(format!("idle for {}s", idle.as_secs())))?
            .map_err(|e| ServerError::Network(format!("read failed: {e}")))?;
        if read == 0 {
            return Ok(None);
        }
        inbound.extend_from_slice(&chunk[..read]);
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, mut receiver: mpsc::Receiver<EncodedFrame>) {
    while let Some(frame) = receiver.recv().await {
        if let Err(e) = writer.write_all(&frame.bytes).await {
            debug!("Failed to write {}: {}", frame.opcode, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn finish_writer(writer_task: &mut JoinHandle<()>) {
    if writer_task.is_finished() {
        return;
    }
    if timeout(WRITER_GRACE, &mut *writer_task).await.is_err() {
        writer_task.abort();
    }
}

/// Resolves once shutdown has been initiated.
pub(crate) async fn shutdown_initiated(state: &ShutdownState) {
    while !state.is_shutdown_initiated() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn protocol_error(error: ProtocolError) -> ServerError {
    ServerError::Network(error.to_string())
}
