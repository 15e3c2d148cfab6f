//! Server implementation.
//!
//! An authoritative server loop on a fixed tick. It supports:
//! - Loading a JSON brush map (or the built-in test course)
//! - Client connection with a handshake that ships everything prediction needs
//! - Per-client command intake over UDP and per-client snapshots back
//! - Console commands (status, kill, freeze, quit) and `sv_*` movement cvars,
//!   with tuning edits replicated to clients at the next tick
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use anyhow::Context;
use pmove_shared::{
    config::EngineConfig,
    console::{Console, CvarFlags, CvarValue},
    net::{
        decode_from_bytes, encode_to_bytes, ClientId, NetMsg, ReliableConn, ReliableListener,
        ServerInfo, MAX_DATAGRAM_LEN, PROTOCOL_VERSION,
    },
    world::BrushWorld,
};
use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{net::UdpSocket, sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

use crate::sim::{FixedStep, Simulation, TickReport};

/// Connected client state.
struct ClientConn {
    reliable: ReliableConn,
    udp_peer: SocketAddr,
    /// Whether the client has asked for a player.
    ready: bool,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    pub console: Console,
    sim: Simulation,
    clients: BTreeMap<ClientId, ClientConn>,

    tcp: ReliableListener,
    udp: UdpSocket,

    running: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds sockets at `cfg.server_addr` and loads the configured map.
    pub async fn bind(cfg: EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        // Port 0 picks an ephemeral TCP port; UDP shares whatever it got.
        let udp_addr = tcp.local_addr()?;
        let udp = UdpSocket::bind(udp_addr).await.context("udp bind")?;
        Self::with_sockets(cfg, tcp, udp)
    }

    fn with_sockets(
        mut cfg: EngineConfig,
        tcp: ReliableListener,
        udp: UdpSocket,
    ) -> anyhow::Result<Self> {
        let world = match &cfg.map {
            Some(path) => BrushWorld::load(path)?,
            None => BrushWorld::test_course(),
        };
        info!(
            map = %world.name(),
            brushes = world.brushes().len(),
            spawns = world.spawn_points().len(),
            "Map loaded"
        );

        cfg.server_addr = tcp.local_addr()?.to_string();

        let mut console = Console::with_movement_cvars(&cfg.tuning);
        Self::register_cvars(&mut console, &cfg);

        let sim = Simulation::new(world, cfg.tuning, cfg.tick_hz);

        Ok(Self {
            cfg,
            console,
            sim,
            clients: BTreeMap::new(),
            tcp,
            udp,
            running: true,
            console_rx: None,
        })
    }

    fn register_cvars(console: &mut Console, cfg: &EngineConfig) {
        console.register_cvar(
            "sv_tickrate",
            CvarValue::Int(i64::from(cfg.tick_hz)),
            "Server tick rate (fixed at startup)",
            CvarFlags::SERVER_ONLY,
        );
        console.register_cvar(
            "hostname",
            CvarValue::Text("pmove".to_string()),
            "Server name",
            CvarFlags::ARCHIVE,
        );
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// False once `quit` has run.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            tick_hz: self.sim.tick_hz(),
            tuning: *self.sim.tuning(),
            map: self.sim.world().to_map(),
        }
    }

    /// Accepts exactly one client (handshake + server info).
    pub async fn accept_one(&mut self) -> anyhow::Result<ClientId> {
        let (conn, peer) = self.tcp.accept().await?;
        self.handle_new_connection(conn, peer).await
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<ClientId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => self.handle_new_connection(conn, peer).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // Timeout
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: ReliableConn,
        peer: SocketAddr,
    ) -> anyhow::Result<ClientId> {
        let handshake_timeout = Duration::from_secs(5);
        let hello = conn
            .recv_timeout(handshake_timeout)
            .await?
            .context("handshake timed out")?;
        match hello {
            NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
            NetMsg::Hello { protocol } => {
                let reason = format!("protocol {protocol} not supported, server speaks {PROTOCOL_VERSION}");
                conn.send(&NetMsg::Disconnect {
                    reason: reason.clone(),
                })
                .await?;
                anyhow::bail!(reason);
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        }

        let client_udp_port = match conn
            .recv_timeout(handshake_timeout)
            .await?
            .context("handshake timed out")?
        {
            NetMsg::UdpHello { client_udp_port } => client_udp_port,
            other => anyhow::bail!("expected UdpHello, got {other:?}"),
        };

        let id = ClientId::new_unique();
        conn.send(&NetMsg::Welcome {
            client_id: id,
            server_info: self.server_info(),
        })
        .await?;

        let udp_peer = SocketAddr::new(peer.ip(), client_udp_port);
        self.clients.insert(
            id,
            ClientConn {
                reliable: conn,
                udp_peer,
                ready: false,
            },
        );

        info!(client_id = ?id, %udp_peer, "Client connected");
        Ok(id)
    }

    /// Marks a client as ready and spawns their player.
    pub fn client_ready(&mut self, client_id: ClientId) -> anyhow::Result<()> {
        let client = self
            .clients
            .get_mut(&client_id)
            .context("client not found")?;
        if client.ready {
            return Ok(());
        }
        client.ready = true;
        self.sim.add_player(client_id);
        info!(client_id = ?client_id, "Client ready, player spawned");
        Ok(())
    }

    /// Drops a client and its player.
    pub fn drop_client(&mut self, client_id: ClientId, reason: &str) {
        if self.clients.remove(&client_id).is_some() {
            self.sim.remove_player(client_id);
            info!(client_id = ?client_id, reason, "Client disconnected");
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(self.sim.frame_time());
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Serves until `quit`: accepts clients between ticks and runs as many
    /// ticks as wall-clock time says are due.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut clock = FixedStep::new(self.sim.tick_hz());
        let mut last = Instant::now();

        while self.running {
            match self.try_accept(Duration::from_millis(1)).await {
                Ok(Some(cid)) => debug!(client_id = ?cid, "New client accepted"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Handshake failed"),
            }

            let now = Instant::now();
            let due = clock.advance(now - last);
            last = now;
            for _ in 0..due {
                self.step().await?;
            }

            tokio::time::sleep(clock.step() / 2).await;
        }

        for client in self.clients.values_mut() {
            let _ = client
                .reliable
                .send(&NetMsg::Disconnect {
                    reason: "server shutting down".to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self) -> anyhow::Result<TickReport> {
        self.process_console_commands();
        self.replicate_tuning().await;
        self.recv_commands()?;

        let report = self.sim.run_tick();
        if report.tuning_changed {
            info!(tick = report.tick, "Movement tuning changed");
        }
        for fall in &report.falls {
            if fall.fatal {
                info!(client_id = ?fall.client_id, fall_velocity = fall.impact.fall_velocity, "Player died from a fall");
                self.print_to(fall.client_id, "You fell to your death.").await;
            }
        }

        self.send_snapshots().await?;
        Ok(report)
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            match self.exec_console(&line) {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => println!("Error: {:#}", e),
            }
        }
    }

    /// Queues console tuning edits for the next tick and tells every client.
    async fn replicate_tuning(&mut self) {
        if !self.console.take_replicated_changes() {
            return;
        }
        let tuning = self.console.tuning();
        self.sim.set_tuning(tuning);

        let msg = NetMsg::TuningUpdate {
            tick: self.sim.tick(),
            tuning,
        };
        let mut failed = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            if let Err(e) = client.reliable.send(&msg).await {
                warn!(client_id = ?id, error = %e, "Failed to send tuning update");
                failed.push(*id);
            }
        }
        for id in failed {
            self.drop_client(id, "reliable channel closed");
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();

        // Handle built-in server commands first.
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Ok(Vec::new());
        };

        match command {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Map: {}", self.sim.world().name()));
                out.push(format!("Tick: {} @ {} Hz", self.sim.tick(), self.sim.tick_hz()));
                out.push(format!("Clients: {}", self.clients.len()));
                for (id, client) in &self.clients {
                    let player = self.sim.player(*id);
                    let detail = match player {
                        Some(slot) => format!(
                            "origin={:?} speed={:.1} health={:.0} ack={}",
                            slot.pm.origin,
                            slot.pm.speed_2d(),
                            slot.health,
                            slot.last_processed()
                        ),
                        None => "not spawned".to_string(),
                    };
                    out.push(format!("  {:?}: udp={} {}", id, client.udp_peer, detail));
                }
                Ok(out)
            }
            "kill" => {
                let id = parse_client_arg(&tokens)?;
                if self.sim.kill(id) {
                    Ok(vec![format!("Killed {:?}", id)])
                } else {
                    Ok(vec![format!("No player {:?}", id)])
                }
            }
            "freeze" => {
                let id = parse_client_arg(&tokens)?;
                match self.sim.toggle_frozen(id) {
                    Some(frozen) => Ok(vec![format!("{:?} frozen: {}", id, frozen)]),
                    None => Ok(vec![format!("No player {:?}", id)]),
                }
            }
            "respawn" => {
                let id = parse_client_arg(&tokens)?;
                if self.sim.player(id).is_none() {
                    return Ok(vec![format!("No player {:?}", id)]);
                }
                let origin = self.sim.add_player(id).origin;
                Ok(vec![format!("Respawned {:?} at {:?}", id, origin)])
            }
            "history" => Ok(self
                .console
                .history()
                .enumerate()
                .map(|(n, line)| format!("{:3}: {}", n + 1, line))
                .collect()),
            "quit" | "exit" => {
                info!("Server shutting down");
                self.running = false;
                Ok(vec!["Shutting down".to_string()])
            }
            _ => {
                // Delegate to console system.
                self.console.exec(line)
            }
        }
    }

    fn recv_commands(&mut self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            match self.udp.try_recv_from(&mut buf) {
                Ok((n, from)) => match decode_from_bytes(&buf[..n]) {
                    Ok(msg) => self.handle_udp_message(from, msg),
                    Err(e) => debug!(%from, error = %e, "Dropping malformed datagram"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(())
    }

    fn handle_udp_message(&mut self, from: SocketAddr, msg: NetMsg) {
        match msg {
            NetMsg::UserCmds { client_id, cmds } => {
                let Some(client) = self.clients.get_mut(&client_id) else {
                    debug!(client_id = ?client_id, %from, "Commands from unknown client");
                    return;
                };
                client.udp_peer = from;
                let queued = self.sim.queue_commands(client_id, &cmds);
                debug!(client_id = ?client_id, received = cmds.len(), queued, "User commands");
            }
            NetMsg::ClientReady { client_id } => {
                if let Err(e) = self.client_ready(client_id) {
                    warn!(client_id = ?client_id, error = %e, "Failed to mark client ready");
                }
            }
            NetMsg::Disconnect { reason } => {
                let id = self
                    .clients
                    .iter()
                    .find(|(_, c)| c.udp_peer == from)
                    .map(|(id, _)| *id);
                if let Some(id) = id {
                    self.drop_client(id, &reason);
                }
            }
            _ => {
                debug!(?msg, "Unexpected UDP message");
            }
        }
    }

    async fn print_to(&mut self, client_id: ClientId, message: &str) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        let msg = NetMsg::ServerPrint {
            message: message.to_string(),
        };
        if let Err(e) = client.reliable.send(&msg).await {
            warn!(client_id = ?client_id, error = %e, "Failed to send print");
        }
    }

    async fn send_snapshots(&self) -> anyhow::Result<()> {
        for (id, client) in &self.clients {
            if !client.ready {
                continue;
            }
            let Some(snapshot) = self.sim.snapshot_for(*id) else {
                continue;
            };
            let payload = encode_to_bytes(&NetMsg::Snapshot(snapshot)).context("serialize snapshot")?;
            if let Err(e) = self.udp.send_to(&payload, client.udp_peer).await {
                debug!(client_id = ?id, error = %e, "Snapshot send failed");
            }
        }
        Ok(())
    }
}

fn parse_client_arg(tokens: &[&str]) -> anyhow::Result<ClientId> {
    let arg = tokens
        .get(1)
        .with_context(|| format!("usage: {} <client id>", tokens.first().unwrap_or(&"")))?;
    let id: u32 = arg
        .parse()
        .with_context(|| format!("bad client id '{}'", arg))?;
    Ok(ClientId(id))
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(cfg: EngineConfig) -> anyhow::Result<(GameServer, EngineConfig)> {
    let cfg = EngineConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ..cfg
    };
    let server = GameServer::bind(cfg).await?;
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
