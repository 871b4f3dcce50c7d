//! # Realm Load-Test Client
//!
//! Drives a number of simulated players against a running world server using
//! the real wire protocol. Each player:
//! - authenticates on the realm socket and logs a character in
//! - follows `ConnectTo` onto a second, instance socket
//! - wanders around its spawn point, pings, swings at creatures it has seen
//!   and challenges other players to duels
//! - logs out once the simulation time is up
//!
//! Received traffic is counted per opcode so server-side fan-out can be
//! eyeballed after a run.

use clap::Parser;
use futures::future::join_all;
use rand::Rng;
use realm_protocol::packets::{
    AttackStart, AttackSwing, AuthContinuedSession, AuthResponse, AuthResult, AuthSession, ConnectTo,
    DuelComplete, DuelOutcome, DuelProposed, DuelRequested, DuelResponse, LoginVerifyWorld, LogoutRequest,
    MoveNotify, MoveUpdate, MovementFlags, MovementInfo, Ping, PlayerLogin, Pong,
};
use realm_protocol::{
    decode_response, encode_request, smsg, ClientPacket, ConnectionType, Frame, Opcode, ProtocolError,
    ServerPacket, DEFAULT_MAX_FRAME_SIZE,
};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, error, info, warn};
use world_sim::ObjectGuid;

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Realm world server - simulated player load")]
struct Args {
    /// World server realm address
    #[arg(short, long, default_value = "127.0.0.1:8085")]
    server: String,

    /// Number of simultaneous players to simulate
    #[arg(short, long, default_value = "5")]
    players: u32,

    /// Movement updates per second
    #[arg(short, long, default_value = "4.0")]
    move_freq: f64,

    /// Melee swings per minute, against creatures the player has seen
    #[arg(short, long, default_value = "6.0")]
    attack_freq: f64,

    /// Duel proposals per minute, against players the player has seen
    #[arg(long, default_value = "1.0")]
    duel_freq: f64,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// How far from its spawn point a player wanders
    #[arg(short, long, default_value = "40.0")]
    wander_radius: f32,

    /// Client locale tag sent with the auth packet
    #[arg(long, default_value = "enUS")]
    locale: String,
}

/// Walking pace, comfortably under the server's run speed check.
const WALK_SPEED: f32 = 4.0;
const PING_INTERVAL: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error surfaced by a single simulated player.
#[derive(Debug)]
enum ClientError {
    Io(std::io::Error),
    Protocol(ProtocolError),
    Refused(AuthResult),
    Closed(&'static str),
    Timeout(&'static str),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "io: {e}"),
            ClientError::Protocol(e) => write!(f, "protocol: {e}"),
            ClientError::Refused(result) => write!(f, "auth refused: {result:?}"),
            ClientError::Closed(socket) => write!(f, "{socket} socket closed"),
            ClientError::Timeout(what) => write!(f, "timed out waiting for {what}"),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

/// Frame tagged with the socket it arrived on.
struct Inbound {
    connection: ConnectionType,
    frame: Frame,
}

/// Per-player counters, merged into the run summary.
#[derive(Debug, Default)]
struct PlayerStats {
    received: BTreeMap<u32, u64>,
    moves_sent: u64,
    swings_sent: u64,
    duels_proposed: u64,
    duels_accepted: u64,
    pings_sent: u64,
    best_latency: Option<Duration>,
}

impl PlayerStats {
    fn record(&mut self, opcode: Opcode) {
        *self.received.entry(opcode.raw()).or_default() += 1;
    }

    fn merge(&mut self, other: PlayerStats) {
        for (opcode, count) in other.received {
            *self.received.entry(opcode).or_default() += count;
        }
        self.moves_sent += other.moves_sent;
        self.swings_sent += other.swings_sent;
        self.duels_proposed += other.duels_proposed;
        self.duels_accepted += other.duels_accepted;
        self.pings_sent += other.pings_sent;
        self.best_latency = match (self.best_latency, other.best_latency) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// One simulated player and what it has learned about the world.
struct SimulatedPlayer {
    id: u32,
    guid: u64,
    spawn: (f32, f32, f32),
    position: (f32, f32, f32),
    heading: f32,
    started: Instant,
    known_creatures: HashSet<u64>,
    known_players: HashSet<u64>,
    ping_sent: Option<(u32, Instant)>,
    ping_serial: u32,
    stats: PlayerStats,
}

impl SimulatedPlayer {
    fn movement(&self, moving: bool) -> MovementInfo {
        MovementInfo {
            guid: self.guid,
            flags: MovementFlags::Legacy(if moving { MovementFlags::FORWARD as u16 } else { 0 }),
            time: self.started.elapsed().as_millis() as u32,
            x: self.position.0,
            y: self.position.1,
            z: self.position.2,
            orientation: self.heading,
        }
    }

    /// Advances one step, turning back towards spawn when straying too far.
    fn wander(&mut self, step: f32, radius: f32) {
        let mut rng = rand::thread_rng();
        let dx = self.position.0 - self.spawn.0;
        let dy = self.position.1 - self.spawn.1;
        if (dx * dx + dy * dy).sqrt() > radius {
            self.heading = (-dy).atan2(-dx);
        } else {
            self.heading += rng.gen_range(-0.6..0.6);
        }
        self.heading = self.heading.rem_euclid(std::f32::consts::TAU);
        self.position.0 += self.heading.cos() * step;
        self.position.1 += self.heading.sin() * step;
    }

    fn random_known(set: &HashSet<u64>) -> Option<u64> {
        if set.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..set.len());
        set.iter().nth(index).copied()
    }

    fn observe(&mut self, guid: u64) {
        let object = ObjectGuid(guid);
        if guid == self.guid {
            return;
        }
        if object.is_creature() {
            self.known_creatures.insert(guid);
        } else if object.is_player() {
            self.known_players.insert(guid);
        }
    }
}

/// Writes `packet` framed for `connection`.
async fn send<P: ClientPacket>(
    writer: &mut OwnedWriteHalf,
    packet: &P,
    connection: ConnectionType,
) -> Result<(), ClientError> {
    let frame = encode_request(packet, connection)?;
    writer.write_all(&frame.bytes).await?;
    Ok(())
}

/// Pumps frames from one socket into the player's inbox until EOF.
async fn read_frames(mut reader: OwnedReadHalf, connection: ConnectionType, inbox: mpsc::Sender<Inbound>) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        loop {
            match Frame::split(&pending, DEFAULT_MAX_FRAME_SIZE) {
                Ok(Some((frame, used))) => {
                    pending.drain(..used);
                    if inbox.send(Inbound { connection, frame }).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping {:?} socket after bad frame: {}", connection, e);
                    return;
                }
            }
        }
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => pending.extend_from_slice(&chunk[..read]),
        }
    }
}

/// Waits for the next frame on `connection`, counting anything else that
/// arrives in between.
async fn next_on(
    inbox: &mut mpsc::Receiver<Inbound>,
    connection: ConnectionType,
    stats: &mut PlayerStats,
    what: &'static str,
) -> Result<Frame, ClientError> {
    loop {
        let inbound = timeout(RESPONSE_TIMEOUT, inbox.recv())
            .await
            .map_err(|_| ClientError::Timeout(what))?
            .ok_or(ClientError::Closed(what))?;
        stats.record(inbound.frame.opcode);
        if inbound.connection == connection {
            return Ok(inbound.frame);
        }
    }
}

async fn expect<P: ServerPacket>(
    inbox: &mut mpsc::Receiver<Inbound>,
    connection: ConnectionType,
    stats: &mut PlayerStats,
    what: &'static str,
) -> Result<P, ClientError> {
    loop {
        let frame = next_on(inbox, connection, stats, what).await?;
        if frame.opcode == P::OPCODE {
            return Ok(decode_response(&frame.payload)?);
        }
        debug!("Skipping {} while waiting for {}", frame.opcode, what);
    }
}

async fn simulate_player(id: u32, server: SocketAddr, args: &Args) -> Result<PlayerStats, ClientError> {
    let (inbox_tx, mut inbox) = mpsc::channel(1024);
    let mut stats = PlayerStats::default();

    // Realm socket: authenticate and log in.
    let (realm_read, mut realm) = TcpStream::connect(server).await?.into_split();
    tokio::spawn(read_frames(realm_read, ConnectionType::Realm, inbox_tx.clone()));

    send(
        &mut realm,
        &AuthSession {
            build: 1,
            account_id: id,
            locale: args.locale.clone(),
            account_name: format!("loadtest{id}"),
        },
        ConnectionType::Realm,
    )
    .await?;
    let auth: AuthResponse = expect(&mut inbox, ConnectionType::Realm, &mut stats, "auth response").await?;
    if auth.result != AuthResult::Ok {
        return Err(ClientError::Refused(auth.result));
    }
    debug!("Player {} authenticated, motd: {}", id, auth.motd);

    send(&mut realm, &PlayerLogin { character: u64::from(id) }, ConnectionType::Realm).await?;
    let connect_to: ConnectTo = expect(&mut inbox, ConnectionType::Realm, &mut stats, "connect to").await?;

    // Instance socket: redeem the key handed out on the realm socket.
    let instance_addr = SocketAddr::new(server.ip(), connect_to.port);
    let (instance_read, mut instance) = TcpStream::connect(instance_addr).await?.into_split();
    tokio::spawn(read_frames(instance_read, ConnectionType::Instance, inbox_tx));
    send(
        &mut instance,
        &AuthContinuedSession {
            key: connect_to.key,
            serial: connect_to.serial,
        },
        ConnectionType::Instance,
    )
    .await?;
    let resume = next_on(&mut inbox, ConnectionType::Instance, &mut stats, "resume comms").await?;
    if resume.opcode != smsg::RESUME_COMMS {
        warn!("Player {} expected RESUME_COMMS, got {}", id, resume.opcode);
    }
    let verify: LoginVerifyWorld =
        expect(&mut inbox, ConnectionType::Instance, &mut stats, "login verify world").await?;

    let spawn = (verify.x, verify.y, verify.z);
    let mut player = SimulatedPlayer {
        id,
        guid: verify.guid,
        spawn,
        position: spawn,
        heading: verify.orientation,
        started: Instant::now(),
        known_creatures: HashSet::new(),
        known_players: HashSet::new(),
        ping_sent: None,
        ping_serial: 0,
        stats,
    };
    info!("🎮 Player {} in world as {} on map {}", id, ObjectGuid(player.guid), verify.map_id);

    let move_period = Duration::from_secs_f64(1.0 / args.move_freq.max(0.1));
    let step = WALK_SPEED * move_period.as_secs_f32();
    let mut move_timer = interval(move_period);
    let mut attack_timer = interval(Duration::from_secs_f64(60.0 / args.attack_freq.max(0.1)));
    let mut duel_timer = interval(Duration::from_secs_f64(60.0 / args.duel_freq.max(0.1)));
    let mut ping_timer = interval(PING_INTERVAL);
    let deadline = sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = move_timer.tick() => {
                player.wander(step, args.wander_radius);
                send(&mut instance, &MoveUpdate { info: player.movement(true) }, ConnectionType::Instance).await?;
                player.stats.moves_sent += 1;
            }
            _ = attack_timer.tick() => {
                if let Some(victim) = SimulatedPlayer::random_known(&player.known_creatures) {
                    send(&mut instance, &AttackSwing { victim }, ConnectionType::Instance).await?;
                    player.stats.swings_sent += 1;
                }
            }
            _ = duel_timer.tick() => {
                if let Some(target) = SimulatedPlayer::random_known(&player.known_players) {
                    send(&mut instance, &DuelProposed { target }, ConnectionType::Instance).await?;
                    player.stats.duels_proposed += 1;
                }
            }
            _ = ping_timer.tick() => {
                player.ping_serial = player.ping_serial.wrapping_add(1);
                let latency = player.stats.best_latency.map(|d| d.as_millis() as u32).unwrap_or(0);
                send(&mut instance, &Ping { serial: player.ping_serial, latency }, ConnectionType::Instance).await?;
                player.ping_sent = Some((player.ping_serial, Instant::now()));
                player.stats.pings_sent += 1;
            }
            inbound = inbox.recv() => {
                let Some(inbound) = inbound else {
                    return Err(ClientError::Closed("world"));
                };
                player.stats.record(inbound.frame.opcode);
                handle_world_frame(&mut player, &mut instance, inbound.frame).await?;
            }
        }
    }

    send(&mut realm, &LogoutRequest, ConnectionType::Realm).await?;
    match timeout(RESPONSE_TIMEOUT, async {
        while let Some(inbound) = inbox.recv().await {
            player.stats.record(inbound.frame.opcode);
            if inbound.frame.opcode == smsg::LOGOUT_COMPLETE {
                return true;
            }
        }
        false
    })
    .await
    {
        Ok(true) => info!("👋 Player {} logged out", player.id),
        _ => warn!("Player {} did not receive LOGOUT_COMPLETE", player.id),
    }

    Ok(player.stats)
}

/// Reacts to world traffic: learns guids, answers duel requests and times
/// pongs.
async fn handle_world_frame(
    player: &mut SimulatedPlayer,
    instance: &mut OwnedWriteHalf,
    frame: Frame,
) -> Result<(), ClientError> {
    match frame.opcode {
        smsg::MOVE_UPDATE => {
            let notify: MoveNotify = decode_response(&frame.payload)?;
            player.observe(notify.info.guid);
        }
        smsg::ATTACK_START => {
            let start: AttackStart = decode_response(&frame.payload)?;
            player.observe(start.attacker);
            player.observe(start.victim);
        }
        smsg::DUEL_REQUESTED => {
            let request: DuelRequested = decode_response(&frame.payload)?;
            if request.target == player.guid {
                let accepted = rand::thread_rng().gen_bool(0.5);
                send(
                    instance,
                    &DuelResponse {
                        initiator: request.initiator,
                        accepted,
                    },
                    ConnectionType::Instance,
                )
                .await?;
                if accepted {
                    player.stats.duels_accepted += 1;
                }
            }
        }
        smsg::DUEL_COMPLETE => {
            let complete: DuelComplete = decode_response(&frame.payload)?;
            if complete.outcome == DuelOutcome::Won {
                debug!("Duel won by {}", ObjectGuid(complete.initiator));
            }
        }
        smsg::DESTROY_OBJECT => {}
        smsg::PONG => {
            let pong: Pong = decode_response(&frame.payload)?;
            if let Some((serial, sent)) = player.ping_sent {
                if serial == pong.serial {
                    let rtt = sent.elapsed();
                    player.stats.best_latency = Some(player.stats.best_latency.map_or(rtt, |best| best.min(rtt)));
                    player.ping_sent = None;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_summary(stats: &PlayerStats, completed: usize, total: u32) {
    info!("📊 Simulation Summary:");
    info!("  👥 Players completed: {}/{}", completed, total);
    info!("  🏃 Moves sent: {}", stats.moves_sent);
    info!("  ⚔️ Swings sent: {}", stats.swings_sent);
    info!("  🤺 Duels proposed: {}, accepted: {}", stats.duels_proposed, stats.duels_accepted);
    info!("  🏓 Pings sent: {}", stats.pings_sent);
    if let Some(latency) = stats.best_latency {
        info!("  ⏱️ Best round trip: {:?}", latency);
    }
    for (opcode, count) in &stats.received {
        info!("  📨 {}: {}", Opcode(*opcode), count);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let server: SocketAddr = match args.server.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("❌ Invalid server address {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    info!(
        "🚀 Simulating {} player(s) against {} for {}s",
        args.players, server, args.duration
    );

    let runs = (1..=args.players).map(|id| {
        let args = &args;
        async move {
            // Stagger logins so the world does not see them in one tick.
            sleep(Duration::from_millis(u64::from(id) * 50)).await;
            let result = simulate_player(id, server, args).await;
            if let Err(e) = &result {
                error!("❌ Player {} failed: {}", id, e);
            }
            result
        }
    });

    let mut summary = PlayerStats::default();
    let mut completed = 0;
    for stats in join_all(runs).await.into_iter().flatten() {
        completed += 1;
        summary.merge(stats);
    }
    print_summary(&summary, completed, args.players);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> SimulatedPlayer {
        SimulatedPlayer {
            id: 1,
            guid: 7,
            spawn: (0.0, 0.0, 0.0),
            position: (0.0, 0.0, 0.0),
            heading: 0.0,
            started: Instant::now(),
            known_creatures: HashSet::new(),
            known_players: HashSet::new(),
            ping_sent: None,
            ping_serial: 0,
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn wandering_stays_near_spawn() {
        let mut p = player();
        for _ in 0..1000 {
            p.wander(1.0, 10.0);
            let distance = (p.position.0.powi(2) + p.position.1.powi(2)).sqrt();
            // One step past the radius before turning back.
            assert!(distance <= 12.0, "wandered to {distance}");
        }
    }

    #[test]
    fn observe_sorts_guids_and_skips_self() {
        let mut p = player();
        p.observe(7);
        p.observe(8);
        p.observe(ObjectGuid::new(world_sim::HighGuid::Creature, 3).raw());
        assert_eq!(p.known_players.len(), 1);
        assert_eq!(p.known_creatures.len(), 1);
    }

    #[test]
    fn stats_merge_keeps_best_latency() {
        let mut a = PlayerStats {
            best_latency: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        a.record(smsg::PONG);
        let mut b = PlayerStats {
            best_latency: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        b.record(smsg::PONG);
        a.merge(b);
        assert_eq!(a.best_latency, Some(Duration::from_millis(5)));
        assert_eq!(a.received[&smsg::PONG.raw()], 2);
    }
}
