//! Core world server implementation.
//!
//! This module contains the main `WorldServer` struct and its implementation,
//! providing the central orchestration of all server components: listeners,
//! the session manager, the security layer and the world runner.

use crate::{
    config::ServerConfig,
    connection::SessionManager,
    error::ServerError,
    handlers::build_opcode_table,
    security::SecurityManager,
    server::handlers::{handle_connection, shutdown_initiated, ConnectionContext},
    world::{World, WorldRunner},
};
use futures::stream::{FuturesUnordered, StreamExt};
use realm_protocol::{Locale, Localized};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, trace, warn};
use world_sim::{ScriptRegistry, ShutdownState};

/// How often per-IP security bookkeeping is pruned.
const SECURITY_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

const LISTEN_BACKLOG: u32 = 1024;

/// The core world server structure.
///
/// `WorldServer` owns everything that outlives a single socket: the
/// configuration, the session manager and the security layer. The world
/// itself is built when the server starts and is moved onto the world
/// runner, which is the only task that ever touches it.
///
/// # Architecture
///
/// * **Accept loops**: One per listener, each spawning a task per socket
/// * **Connection tasks**: Split frames, answer socket-level opcodes and
///   queue decoded packets for the runner
/// * **World runner**: Executes packets in arrival order and ticks maps
/// * **Session manager**: Routes outbound frames to the right socket
pub struct WorldServer {
    /// Server configuration settings
    config: Arc<ServerConfig>,

    /// Sessions and their realm/instance connection slots
    sessions: Arc<SessionManager>,

    /// Per-IP connection caps and packet rate limiting
    security: Arc<SecurityManager>,

    /// Script registry handed to the world on start
    scripts: Mutex<Option<ScriptRegistry>>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl WorldServer {
    /// Creates a new world server with the built-in creature and instance
    /// scripts.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_scripts(config, ScriptRegistry::with_builtin())
    }

    /// Creates a new world server whose maps resolve AI and instance script
    /// names in `scripts`.
    pub fn with_scripts(config: ServerConfig, scripts: ScriptRegistry) -> Self {
        let sessions = Arc::new(SessionManager::new(config.outbound_queue_limit));
        let security = Arc::new(SecurityManager::new(config.security.clone()));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config: Arc::new(config),
            sessions,
            security,
            scripts: Mutex::new(Some(scripts)),
            shutdown_sender,
        }
    }

    /// Starts the world server and begins accepting connections.
    ///
    /// Runs until [`WorldServer::shutdown`] is called.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown_state(ShutdownState::new()).await
    }

    /// Starts the world server and begins accepting connections with
    /// graceful shutdown support.
    ///
    /// # Arguments
    ///
    /// * `shutdown_state` - Shared shutdown state for coordinating graceful shutdown
    ///
    /// # Startup Sequence
    ///
    /// 1. Bind the listeners (several with `use_reuse_port`)
    /// 2. Build the opcode table and the world
    /// 3. Start the world runner and the security cleanup task
    /// 4. Run the accept loops until shutdown is initiated
    /// 5. Wait for the runner to drain and close every session
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let listeners = self.bind()?;
        self.serve(listeners, shutdown_state).await
    }

    /// Creates the TCP listeners for `bind_address`.
    ///
    /// With `use_reuse_port` one listener per CPU core shares the address.
    /// If any of them cannot be created the server falls back to a single
    /// listener.
    pub fn bind(&self) -> Result<Vec<TcpListener>, ServerError> {
        let core_count = num_cpus::get();
        let use_reuse_port = self.config.use_reuse_port;
        let num_acceptors = if use_reuse_port { core_count } else { 1 };
        info!("🧠 Detected {} CPU cores, using {} acceptor(s)", core_count, num_acceptors);

        let mut listeners: Vec<TcpListener> = Vec::with_capacity(num_acceptors);
        let mut address = self.config.bind_address;
        let mut multi_listener_error = None;
        for i in 0..num_acceptors {
            match bind_listener(address, use_reuse_port) {
                Ok(listener) => {
                    // Later acceptors must share the port the first one got.
                    if i == 0 {
                        if let Ok(local) = listener.local_addr() {
                            address = local;
                        }
                    }
                    trace!("✅ Listener {} bound on {}", i, address);
                    listeners.push(listener);
                }
                Err(e) => {
                    multi_listener_error = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = multi_listener_error {
            if listeners.is_empty() || num_acceptors == 1 {
                return Err(e);
            }
            warn!("Multi-listener creation failed: {}. Falling back to a single listener.", e);
            listeners.truncate(1);
        }
        Ok(listeners)
    }

    /// Serves clients on already bound listeners until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` once the world has drained and every session is closed, or
    /// a `ServerError` if the world could not be built.
    pub async fn serve(&self, listeners: Vec<TcpListener>, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let bound = listeners
            .first()
            .ok_or_else(|| ServerError::Network("no listener to serve on".to_string()))?
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Failed to read bound address: {e}")))?;
        info!("🚀 Starting world server on {}", bound);

        let table = Arc::new(build_opcode_table().map_err(|e| ServerError::Config(e.to_string()))?);
        info!(
            "📦 Opcode table ready: {} client and {} server opcode(s)",
            table.client_opcodes(),
            table.server_opcodes()
        );

        let scripts = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(ScriptRegistry::with_builtin);
        let instance_port = self.config.instance_port.unwrap_or_else(|| bound.port());
        let world = World::new(&self.config.world, scripts, Arc::clone(&self.sessions), instance_port)?;

        let (runner, world_sender) = WorldRunner::new(
            world,
            Duration::from_millis(self.config.tick_interval_ms),
            self.config.map_update_threads,
            shutdown_state.clone(),
        )?;
        let runner_handle = tokio::spawn(runner.run());
        self.start_security_cleanup(shutdown_state.clone());

        let ctx = ConnectionContext {
            config: Arc::clone(&self.config),
            sessions: Arc::clone(&self.sessions),
            security: Arc::clone(&self.security),
            table,
            world: world_sender,
            motd: Arc::new(self.localized_motd()),
            shutdown_state: shutdown_state.clone(),
        };

        // Main server accept loops
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let ctx = ctx.clone();
                async move {
                    loop {
                        let accepted = tokio::select! {
                            accepted = listener.accept() => accepted,
                            _ = shutdown_initiated(&ctx.shutdown_state) => {
                                info!("🛑 Accept loop stopping - shutdown initiated");
                                break;
                            }
                        };
                        match accepted {
                            Ok((stream, addr)) => {
                                let ctx = ctx.clone();

                                // Spawn individual connection handler
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, addr, ctx).await {
                                        debug!("Connection {} ended: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();
        drop(ctx);

        tokio::select! {
            _ = accept_futures.next() => {}
            _ = shutdown_receiver.recv() => {
                info!("Internal shutdown signal received");
            }
            _ = shutdown_initiated(&shutdown_state) => {}
        }
        drop(accept_futures);

        // Server shutdown cleanup
        info!("🧹 Performing server cleanup...");
        shutdown_state.initiate_shutdown();
        if let Err(e) = runner_handle.await {
            error!("World runner terminated abnormally: {}", e);
        }

        let ids = self.sessions.session_ids();
        for id in &ids {
            self.sessions.remove(*id);
        }
        info!("✅ Server cleanup completed, {} session(s) closed", ids.len());
        Ok(())
    }

    /// Signals the accept loops to stop.
    ///
    /// The world still drains the packets already queued before `start`
    /// returns.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub fn security(&self) -> Arc<SecurityManager> {
        Arc::clone(&self.security)
    }

    fn localized_motd(&self) -> Localized<String> {
        let mut motd = Localized::new(self.config.motd.clone());
        for (tag, text) in &self.config.motd_locales {
            match Locale::from_tag(tag) {
                Some(locale) => motd.set(locale, text.clone()),
                None => warn!("Ignoring message of the day for unknown locale '{}'", tag),
            }
        }
        motd
    }

    fn start_security_cleanup(&self, shutdown_state: ShutdownState) {
        let security = Arc::clone(&self.security);
        tokio::spawn(async move {
            let mut ticker = interval(SECURITY_CLEANUP_INTERVAL);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => security.cleanup_stale_connections().await,
                    _ = shutdown_initiated(&shutdown_state) => break,
                }
            }
            debug!("Security cleanup task stopped");
        });
    }
}

fn bind_listener(address: SocketAddr, reuse_port: bool) -> Result<TcpListener, ServerError> {
    let socket = if address.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| ServerError::Network(format!("SO_REUSEADDR failed: {e}")))?;
    if reuse_port {
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket
            .set_reuseport(true)
            .map_err(|e| ServerError::Network(format!("SO_REUSEPORT failed: {e}")))?;
        #[cfg(not(all(unix, not(target_os = "solaris"), not(target_os = "illumos"))))]
        return Err(ServerError::Network("SO_REUSEPORT is not supported on this platform".to_string()));
    }
    socket
        .bind(address)
        .map_err(|e| ServerError::Network(format!("Failed to bind {address}: {e}")))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| ServerError::Network(format!("Failed to listen on {address}: {e}")))
}
