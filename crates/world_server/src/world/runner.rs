//! The world runner: the single consumer of decoded packets.
//!
//! Connection tasks push [`WorldCommand`]s into a bounded queue. The runner
//! executes them one at a time in arrival order, so packets of one session
//! are always handled in the order they were received, and ticks every map
//! on the configured interval. Handler faults and panics are contained here
//! and cost only the packet that caused them.

use super::World;
use crate::error::ServerError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use realm_protocol::{Opcode, PacketJob};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use world_sim::{SessionId, ShutdownState};

/// Depth of the queue between connection tasks and the runner. Readers wait
/// when it is full.
pub const INBOUND_QUEUE_DEPTH: usize = 4096;

/// Work for the simulation thread.
pub enum WorldCommand {
    /// A decoded packet waiting for the world.
    Packet {
        session: SessionId,
        opcode: Opcode,
        job: PacketJob<World>,
    },
    /// The session's realm connection ended.
    Disconnect { session: SessionId },
}

impl std::fmt::Debug for WorldCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorldCommand::Packet { session, opcode, .. } => f
                .debug_struct("Packet")
                .field("session", session)
                .field("opcode", opcode)
                .finish(),
            WorldCommand::Disconnect { session } => f.debug_struct("Disconnect").field("session", session).finish(),
        }
    }
}

/// Owns the [`World`] and drives it.
pub struct WorldRunner {
    world: World,
    receiver: mpsc::Receiver<WorldCommand>,
    tick_interval: Duration,
    pool: Option<ThreadPool>,
    shutdown_state: ShutdownState,
    tick_count: u64,
}

impl WorldRunner {
    /// Creates a runner and the sender connection tasks enqueue work with.
    ///
    /// # Arguments
    ///
    /// * `world` - The fully built world
    /// * `tick_interval` - Time between map updates
    /// * `map_update_threads` - Worker threads for map updates; 1 or less
    ///   updates maps in sequence on the runner itself
    /// * `shutdown_state` - Set to complete once the queue has been drained
    pub fn new(
        world: World,
        tick_interval: Duration,
        map_update_threads: usize,
        shutdown_state: ShutdownState,
    ) -> Result<(Self, mpsc::Sender<WorldCommand>), ServerError> {
        let pool = if map_update_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(map_update_threads)
                .thread_name(|index| format!("map-update-{index}"))
                .build()
                .map_err(|e| ServerError::Internal(format!("Failed to build map update pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        let (sender, receiver) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        Ok((
            Self {
                world,
                receiver,
                tick_interval: tick_interval.max(Duration::from_millis(1)),
                pool,
                shutdown_state,
                tick_count: 0,
            },
            sender,
        ))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one command against the world and delivers what it produced.
    pub fn execute(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Packet { session, opcode, job } => {
                let world = &mut self.world;
                match catch_unwind(AssertUnwindSafe(|| job(world))) {
                    Ok(Ok(())) => {}
                    Ok(Err(fault)) => {
                        warn!(%session, %opcode, "Packet dropped by handler: {}", fault);
                    }
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        error!(%session, %opcode, "Handler panicked, packet dropped: {}", message);
                    }
                }
            }
            WorldCommand::Disconnect { session } => self.world.disconnect(session),
        }
        self.world.flush();
    }

    /// Advances every map by `diff` and delivers the resulting notifications.
    pub fn tick(&mut self, diff: Duration) {
        self.tick_count += 1;
        self.world.update(diff, self.pool.as_ref());
        let delivered = self.world.flush();
        if delivered > 0 {
            debug!(tick = self.tick_count, delivered, "World tick");
        }
    }

    /// Runs until shutdown is initiated, then drains what is still queued
    /// and marks shutdown complete.
    pub async fn run(mut self) {
        info!(
            "🕒 World runner started: tick {}ms, {} map thread(s)",
            self.tick_interval.as_millis(),
            self.pool.as_ref().map_or(1, ThreadPool::current_num_threads)
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.execute(command),
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    self.tick(now - last_tick);
                    last_tick = now;
                    if self.shutdown_state.is_shutdown_initiated() {
                        info!("🕒 World runner stopping - shutdown initiated");
                        break;
                    }
                }
            }
        }

        // Sockets have stopped reading; run what they already queued.
        let mut drained = 0;
        while let Ok(command) = self.receiver.try_recv() {
            self.execute(command);
            drained += 1;
        }
        self.tick(last_tick.elapsed());
        info!("🧹 World runner drained {} queued command(s)", drained);
        self.shutdown_state.complete_shutdown();
    }
}

impl std::fmt::Debug for WorldRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldRunner")
            .field("world", &self.world)
            .field("tick_interval", &self.tick_interval)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}
