//! End-to-end session handling over real sockets.

use realm_protocol::packets::{
    AuthContinuedSession, AuthResponse, AuthResult, AuthSession, ConnectTo, LoginVerifyWorld, Ping, PlayerLogin,
    Pong,
};
use realm_protocol::{
    decode_response, encode_request, smsg, ClientPacket, ConnectionType, EncodedFrame, Frame, Opcode,
    ServerPacket, DEFAULT_MAX_FRAME_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use world_server::{create_server_with_config, ServerConfig, ServerError};
use world_sim::ShutdownState;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    shutdown_state: ShutdownState,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = Arc::new(create_server_with_config(ServerConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            tick_interval_ms: 10,
            ..config
        }));
        let listeners = server.bind().unwrap();
        let addr = listeners[0].local_addr().unwrap();
        let shutdown_state = ShutdownState::new();
        let state = shutdown_state.clone();
        let handle = tokio::spawn(async move { server.serve(listeners, state).await });
        Self {
            addr,
            shutdown_state,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown_state.initiate_shutdown();
        let result = timeout(WAIT, self.handle).await.expect("server did not stop");
        result.unwrap().unwrap();
        assert!(self.shutdown_state.is_shutdown_complete());
    }
}

struct Client {
    stream: TcpStream,
    inbound: Vec<u8>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            inbound: Vec::new(),
        }
    }

    async fn send<P: ClientPacket>(&mut self, packet: &P) {
        let frame = encode_request(packet, ConnectionType::Realm).unwrap();
        self.stream.write_all(&frame.bytes).await.unwrap();
    }

    async fn send_raw(&mut self, frame: EncodedFrame) {
        self.stream.write_all(&frame.bytes).await.unwrap();
    }

    /// Next frame, or `None` once the server closed the socket.
    async fn next_frame(&mut self) -> Option<Frame> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some((frame, used)) = Frame::split(&self.inbound, DEFAULT_MAX_FRAME_SIZE).unwrap() {
                self.inbound.drain(..used);
                return Some(frame);
            }
            let read = timeout(WAIT, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for a frame")
                .ok()?;
            if read == 0 {
                return None;
            }
            self.inbound.extend_from_slice(&chunk[..read]);
        }
    }

    async fn expect<P: ServerPacket>(&mut self) -> P {
        let frame = self.next_frame().await.expect("socket closed");
        assert_eq!(frame.opcode, P::OPCODE, "unexpected opcode");
        decode_response(&frame.payload).unwrap()
    }

    /// Skips unrelated world traffic until a `P` arrives.
    async fn wait_for<P: ServerPacket>(&mut self) -> P {
        loop {
            let frame = self.next_frame().await.expect("socket closed");
            if frame.opcode == P::OPCODE {
                return decode_response(&frame.payload).unwrap();
            }
        }
    }

    async fn authenticate(&mut self, name: &str) -> AuthResponse {
        self.send(&AuthSession {
            build: 1,
            account_id: 1,
            locale: "enUS".to_string(),
            account_name: name.to_string(),
        })
        .await;
        self.expect::<AuthResponse>().await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_and_ping() {
    let server = TestServer::start(ServerConfig {
        motd: "hello".to_string(),
        ..Default::default()
    })
    .await;
    let mut client = Client::connect(server.addr).await;

    let response = client.authenticate("alice").await;
    assert_eq!(response.result, AuthResult::Ok);
    assert_eq!(response.motd, "hello");

    client.send(&Ping { serial: 77, latency: 0 }).await;
    assert_eq!(client.expect::<Pong>().await.serial, 77);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn motd_follows_the_client_locale() {
    let mut config = ServerConfig::default();
    config.motd_locales.insert("deDE".to_string(), "Willkommen".to_string());
    let server = TestServer::start(config).await;
    let mut client = Client::connect(server.addr).await;

    client
        .send(&AuthSession {
            build: 1,
            account_id: 2,
            locale: "deDE".to_string(),
            account_name: "bernd".to_string(),
        })
        .await;
    assert_eq!(client.expect::<AuthResponse>().await.motd, "Willkommen");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_opcode_keeps_the_connection() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = Client::connect(server.addr).await;
    client.authenticate("alice").await;

    client
        .send_raw(EncodedFrame::new(Opcode(0x7777), ConnectionType::Realm, &[1, 2, 3]).unwrap())
        .await;
    client.send(&Ping { serial: 5, latency: 0 }).await;
    assert_eq!(client.expect::<Pong>().await.serial, 5);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn first_frame_must_authenticate() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = Client::connect(server.addr).await;

    client.send(&Ping { serial: 1, latency: 0 }).await;
    assert!(client.next_frame().await.is_none());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn login_moves_in_world_traffic_to_the_instance_socket() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut realm = Client::connect(server.addr).await;
    realm.authenticate("alice").await;

    realm.send(&PlayerLogin { character: 1 }).await;
    let connect_to = realm.expect::<ConnectTo>().await;
    assert_eq!(connect_to.port, server.addr.port());

    let mut instance = Client::connect(server.addr).await;
    instance
        .send(&AuthContinuedSession {
            key: connect_to.key,
            serial: connect_to.serial,
        })
        .await;
    let resume = instance.next_frame().await.expect("instance socket closed");
    assert_eq!(resume.opcode, smsg::RESUME_COMMS);
    let verify = instance.expect::<LoginVerifyWorld>().await;
    assert_eq!(verify.map_id, 0);

    // Pings are answered on the socket that sent them.
    instance.send(&Ping { serial: 9, latency: 0 }).await;
    assert_eq!(instance.wait_for::<Pong>().await.serial, 9);

    // Connect keys are single use.
    let mut replay = Client::connect(server.addr).await;
    replay
        .send(&AuthContinuedSession {
            key: connect_to.key,
            serial: connect_to.serial,
        })
        .await;
    assert!(replay.next_frame().await.is_none());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn full_server_refuses_new_sessions() {
    let server = TestServer::start(ServerConfig {
        max_connections: 1,
        ..Default::default()
    })
    .await;
    let mut first = Client::connect(server.addr).await;
    assert_eq!(first.authenticate("alice").await.result, AuthResult::Ok);

    let mut second = Client::connect(server.addr).await;
    assert_eq!(second.authenticate("bob").await.result, AuthResult::ServerFull);
    assert!(second.next_frame().await.is_none());

    server.stop().await;
}
