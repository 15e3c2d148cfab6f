//! Client implementation.
//!
//! The client maintains:
//! - A reliable control stream (handshake, tuning updates, prints)
//! - An unreliable datagram socket (commands out, snapshots in)
//! - A predictor running the movement kernel on the client's own commands
//! - Snapshot history for interpolating other players
//! - Console for user commands

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use pmove_shared::{
    config::{EngineConfig, PredictionConfig},
    console::{Console, CvarFlags, CvarValue},
    net::{ClientId, NetMsg, ReliableConn, ServerInfo, Snapshot, UnreliableConn, UserCmd, PROTOCOL_VERSION},
    pmove::PlayerMove,
    world::BrushWorld,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::{
    input::{build_command, InputState},
    interp::SnapshotBuffer,
    predict::{PredictionStats, Predictor, Reconcile},
};

/// Snapshots between prediction summaries in the log.
const STATS_LOG_INTERVAL: u64 = 512;

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any server.
    Disconnected,
    /// Handshake done, no player yet.
    Connected,
    /// Ready sent, waiting for the first snapshot.
    Spawning,
    /// Predicting and sending commands.
    Playing,
}

/// High-level game client.
pub struct GameClient {
    pub client_id: ClientId,
    pub state: ClientState,
    pub console: Console,
    pub server_info: ServerInfo,

    reliable_rx: mpsc::Receiver<NetMsg>,
    pub unreliable: UnreliableConn,
    pub snaps: SnapshotBuffer,

    world: BrushWorld,
    prediction: PredictionConfig,
    predictor: Option<Predictor>,
    next_sequence: u32,
    /// Newest commands, resent with every datagram.
    backup: VecDeque<UserCmd>,
    snapshots_seen: u64,

    /// Server messages to display.
    pub server_messages: Vec<String>,
}

impl GameClient {
    /// Connects to a server and performs handshake.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

        info!(server = %server_addr, "Connecting to server");

        // Bind UDP first so we can tell the server where to send snapshots.
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let unreliable = UnreliableConn::connect(bind, server_addr).await?;
        let client_udp_port = unreliable.local_addr().context("udp local_addr")?.port();

        let mut reliable = ReliableConn::connect(server_addr).await?;
        reliable
            .send(&NetMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await?;
        reliable.send(&NetMsg::UdpHello { client_udp_port }).await?;

        let welcome = reliable
            .recv_timeout(Duration::from_secs(5))
            .await?
            .context("no welcome from server")?;
        let (client_id, server_info) = match welcome {
            NetMsg::Welcome {
                client_id,
                server_info,
            } => (client_id, server_info),
            NetMsg::Disconnect { reason } => anyhow::bail!("server refused connection: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        let world = BrushWorld::from_map(server_info.map.clone()).context("server map")?;
        info!(
            client_id = ?client_id,
            map = %world.name(),
            tick_hz = server_info.tick_hz,
            "Connected to server"
        );

        let mut console = Console::new();
        Self::register_cvars(&mut console, cfg);

        Ok(Self {
            client_id,
            state: ClientState::Connected,
            console,
            server_info,
            reliable_rx: spawn_reliable_reader(reliable),
            unreliable,
            snaps: SnapshotBuffer::new(32),
            world,
            prediction: cfg.prediction,
            predictor: None,
            next_sequence: 1,
            backup: VecDeque::new(),
            snapshots_seen: 0,
            server_messages: Vec::new(),
        })
    }

    fn register_cvars(console: &mut Console, cfg: &EngineConfig) {
        console.register_cvar(
            "name",
            CvarValue::Text(cfg.player_name.clone()),
            "Player name",
            CvarFlags::ARCHIVE,
        );
        console.register_cvar(
            "cl_cmdbackup",
            CvarValue::Int(cfg.prediction.cmd_backup as i64),
            "Commands repeated in each command datagram",
            CvarFlags::ARCHIVE,
        );
    }

    /// Sends a "ready" signal to the server.
    pub async fn send_ready(&mut self) -> anyhow::Result<()> {
        self.unreliable
            .send(&NetMsg::ClientReady {
                client_id: self.client_id,
            })
            .await?;
        if self.state == ClientState::Connected {
            self.state = ClientState::Spawning;
        }
        info!("Sent ready signal to server");
        Ok(())
    }

    /// Sends ready and waits for the first snapshot, which seeds prediction.
    pub async fn spawn(&mut self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.predictor.is_none() {
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("no snapshot within {:?}", timeout);
            }
            // Ready travels over UDP, so repeat it until the server answers.
            self.send_ready().await?;
            self.recv_snapshot(Duration::from_millis(100)).await?;
        }
        Ok(())
    }

    /// Samples one tick of input: predicts it and sends it with backups.
    ///
    /// Returns `None` until the first snapshot has arrived.
    pub async fn tick(&mut self, input: InputState) -> anyhow::Result<Option<UserCmd>> {
        let Some(predictor) = self.predictor.as_mut() else {
            return Ok(None);
        };

        let cmd = build_command(self.next_sequence, input);
        self.next_sequence += 1;
        predictor.predict(cmd);

        let keep = self
            .console
            .get_cvar("cl_cmdbackup")
            .and_then(CvarValue::as_int)
            .unwrap_or(self.prediction.cmd_backup as i64)
            .clamp(1, 64) as usize;
        self.backup.push_back(cmd);
        while self.backup.len() > keep {
            self.backup.pop_front();
        }

        self.unreliable
            .send(&NetMsg::UserCmds {
                client_id: self.client_id,
                cmds: self.backup.iter().copied().collect(),
            })
            .await?;
        Ok(Some(cmd))
    }

    /// Handles everything already received on both channels.
    pub fn poll(&mut self) -> anyhow::Result<()> {
        loop {
            match self.reliable_rx.try_recv() {
                Ok(msg) => self.handle_reliable_message(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.state != ClientState::Disconnected {
                        warn!("Reliable connection closed");
                        self.state = ClientState::Disconnected;
                    }
                    break;
                }
            }
        }

        for msg in self.unreliable.drain()? {
            self.handle_unreliable_message(msg);
        }
        Ok(())
    }

    /// Waits up to `timeout` for one datagram and handles it.
    pub async fn recv_snapshot(&mut self, timeout: Duration) -> anyhow::Result<()> {
        if let Some(msg) = self.unreliable.recv_timeout(timeout).await? {
            self.handle_unreliable_message(msg);
        }
        Ok(())
    }

    fn handle_reliable_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::TuningUpdate { tick, tuning } => {
                info!(tick, "Server changed movement tuning");
                self.server_info.tuning = tuning;
                if let Some(predictor) = self.predictor.as_mut() {
                    predictor.set_tuning(tuning);
                }
            }
            NetMsg::ServerPrint { message } => {
                info!(message = %message, "Server message");
                self.server_messages.push(message);
            }
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected from server");
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "Unhandled reliable message");
            }
        }
    }

    fn handle_unreliable_message(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Snapshot(snap) => self.on_snapshot(snap),
            other => {
                debug!(?other, "Unexpected UDP message");
            }
        }
    }

    fn on_snapshot(&mut self, snap: Snapshot) {
        let ack = snap.ack;
        let local = snap.local.clone();
        if !self.snaps.push(snap) {
            return;
        }
        self.snapshots_seen += 1;

        match self.predictor.as_mut() {
            None => {
                info!(origin = ?local.origin, "Spawned");
                self.predictor = Some(Predictor::new(
                    local,
                    self.server_info.tuning,
                    self.world.clone(),
                    self.server_info.tick_hz,
                    &self.prediction,
                ));
                self.state = ClientState::Playing;
            }
            Some(predictor) => {
                if let Reconcile::Corrected { replayed } = predictor.reconcile(ack, &local) {
                    debug!(ack, replayed, "Prediction corrected");
                }
                if self.snapshots_seen % STATS_LOG_INTERVAL == 0 {
                    let stats = predictor.stats();
                    info!(
                        predicted = stats.predicted,
                        corrections = stats.corrections,
                        replayed = stats.replayed,
                        "Prediction stats"
                    );
                }
            }
        }
    }

    /// The locally predicted player, once spawned.
    pub fn predicted(&self) -> Option<&PlayerMove> {
        self.predictor.as_ref().map(Predictor::state)
    }

    pub fn prediction_stats(&self) -> Option<PredictionStats> {
        self.predictor.as_ref().map(Predictor::stats)
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Ok(Vec::new());
        };

        match command {
            "disconnect" => {
                self.disconnect("user quit").await?;
                Ok(vec!["Disconnected".to_string()])
            }
            "status" => {
                let mut out = Vec::new();
                out.push(format!("State: {:?}", self.state));
                out.push(format!("Client ID: {:?}", self.client_id));
                out.push(format!("Map: {}", self.world.name()));
                out.push(format!("Next command: {}", self.next_sequence));
                if let Some(pm) = self.predicted() {
                    out.push(format!("Origin: {:?} speed {:.1}", pm.origin, pm.speed_2d()));
                }
                if let Some(stats) = self.prediction_stats() {
                    out.push(format!(
                        "Predicted {} confirmed {} corrected {}",
                        stats.predicted, stats.confirmed, stats.corrections
                    ));
                }
                out.push(format!("Snapshots buffered: {}", self.snaps.len()));
                Ok(out)
            }
            _ => {
                // Delegate to console system.
                self.console.exec(line)
            }
        }
    }

    /// Tells the server we are leaving.
    pub async fn disconnect(&mut self, reason: &str) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        self.unreliable
            .send(&NetMsg::Disconnect {
                reason: reason.to_string(),
            })
            .await?;
        self.state = ClientState::Disconnected;
        Ok(())
    }
}

/// Moves the reliable connection onto its own task so a half-read frame is
/// never abandoned by a poll timeout.
fn spawn_reliable_reader(mut conn: ReliableConn) -> mpsc::Receiver<NetMsg> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            match conn.recv().await {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Reliable reader stopped");
                    break;
                }
            }
        }
    });
    rx
}
