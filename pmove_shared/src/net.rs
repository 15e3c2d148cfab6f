//! Networking primitives.
//!
//! Goals:
//! - Provide a simple reliable (TCP) and unreliable (UDP) channel.
//! - Provide the command, snapshot and tuning messages that keep a predicting
//!   client in lockstep with the authoritative server.
//! - Keep serialization explicit and versionable.
//!
//! Everything a client needs to run the movement kernel exactly as the server
//! does (tick rate, tuning, map) arrives in [`ServerInfo`] with the welcome.

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    time,
};

use crate::{
    math::Vec3,
    pmove::{Buttons, Hull, MoveTuning, PlayerFlags, PlayerMove},
    world::MapData,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 2;

/// Largest reliable frame accepted.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Receive buffer size for datagrams.
pub const MAX_DATAGRAM_LEN: usize = 64 * 1024;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    /// Client announces its UDP port to the server.
    UdpHello {
        client_udp_port: u16,
    },
    Welcome {
        client_id: ClientId,
        server_info: ServerInfo,
    },
    /// Client has built its world and wants a player.
    ClientReady {
        client_id: ClientId,
    },

    // ─── Gameplay ───
    /// Client -> server: the newest commands, oldest first. Earlier ones are
    /// repeats in case a datagram was lost.
    UserCmds {
        client_id: ClientId,
        cmds: Vec<UserCmd>,
    },
    /// Server -> client: authoritative state.
    Snapshot(Snapshot),
    /// Server -> client: movement tuning changed, effective from `tick`.
    TuningUpdate {
        tick: u32,
        tuning: MoveTuning,
    },

    // ─── Console ───
    /// Server -> client: print message to console.
    ServerPrint {
        message: String,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Everything a client needs to predict its own movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    pub tick_hz: u32,
    pub tuning: MoveTuning,
    pub map: MapData,
}

impl ServerInfo {
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}

/// One tick of player intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct UserCmd {
    /// Strictly increasing per client, starting at 1.
    pub sequence: u32,
    pub view_angles: Vec3,
    pub forward_move: f32,
    pub side_move: f32,
    pub up_move: f32,
    pub buttons: Buttons,
}

impl UserCmd {
    /// Loads this command into a movement context for one tick.
    ///
    /// Axes arrive off the wire, so they are forced into `[-1, 1]` here
    /// rather than trusted.
    pub fn apply(&self, pm: &mut PlayerMove, frame_time: f32) {
        pm.view_angles = if self.view_angles.is_finite() {
            self.view_angles
        } else {
            Vec3::ZERO
        };
        pm.forward_move = clamp_axis(self.forward_move);
        pm.side_move = clamp_axis(self.side_move);
        pm.up_move = clamp_axis(self.up_move);
        pm.buttons = self.buttons;
        pm.frame_time = frame_time;
    }
}

fn clamp_axis(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Public state of another player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub client_id: ClientId,
    pub origin: Vec3,
    pub velocity: Vec3,
    pub view_angles: Vec3,
    pub flags: PlayerFlags,
    pub hull: Hull,
}

impl PlayerState {
    pub fn from_move(client_id: ClientId, pm: &PlayerMove) -> Self {
        Self {
            client_id,
            origin: pm.origin,
            velocity: pm.velocity,
            view_angles: pm.view_angles,
            flags: pm.flags,
            hull: pm.use_hull,
        }
    }
}

/// Per-client world snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub tick: u32,
    /// Sequence of the last command the server ran for this client; 0 before
    /// the first one.
    pub ack: u32,
    /// The receiving client's full movement state after `ack`.
    pub local: PlayerMove,
    /// Everyone else.
    pub players: Vec<PlayerState>,
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}");
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        decode_from_bytes(&payload)
    }

    /// Receives a frame if one arrives within `timeout`.
    ///
    /// A timeout can cut a frame in half, so only use this between whole
    /// messages on a connection that is otherwise idle.
    pub async fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<NetMsg>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

/// Unreliable channel over UDP.
#[derive(Debug)]
pub struct UnreliableConn {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UnreliableConn {
    pub async fn connect(bind_addr: SocketAddr, peer: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.context("udp bind")?;
        socket.connect(peer).await.context("udp connect")?;
        Ok(Self { socket, peer })
    }

    pub async fn send(&self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = encode_to_bytes(msg)?;
        self.socket.send(&payload).await.context("udp send")?;
        Ok(())
    }

    pub async fn recv(&self) -> anyhow::Result<NetMsg> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let n = self.socket.recv(&mut buf).await.context("udp recv")?;
        decode_from_bytes(&buf[..n])
    }

    /// Receives a datagram within the given timeout.
    pub async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<NetMsg>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        match time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => decode_from_bytes(&buf[..n]).map(Some),
            Ok(Err(e)) => Err(e).context("udp recv"),
            Err(_) => Ok(None),
        }
    }

    /// Drains every datagram already queued on the socket.
    pub fn drain(&self) -> anyhow::Result<Vec<NetMsg>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let mut out = Vec::new();
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(n) => match decode_from_bytes(&buf[..n]) {
                    Ok(msg) => out.push(msg),
                    Err(e) => tracing::debug!(error = %e, "dropping malformed datagram"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        Ok(out)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::BrushWorld;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn apply_clamps_wire_values() {
        let cmd = UserCmd {
            sequence: 9,
            view_angles: Vec3::new(10.0, 90.0, 0.0),
            forward_move: 3.0,
            side_move: f32::NAN,
            up_move: -2.0,
            buttons: Buttons::JUMP | Buttons::DUCK,
        };
        let mut pm = PlayerMove::default();
        cmd.apply(&mut pm, 1.0 / 128.0);

        assert_eq!(pm.forward_move, 1.0);
        assert_eq!(pm.side_move, 0.0);
        assert_eq!(pm.up_move, -1.0);
        assert_eq!(pm.view_angles, Vec3::new(10.0, 90.0, 0.0));
        assert_eq!(pm.buttons, Buttons::JUMP | Buttons::DUCK);
        assert_eq!(pm.frame_time, 1.0 / 128.0);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_from_bytes(b"{\"Nope\":1}").is_err());
        assert!(decode_from_bytes(b"").is_err());
    }

    #[tokio::test]
    async fn reliable_frames_cross_a_socket() {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = ReliableListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let welcome = NetMsg::Welcome {
            client_id: ClientId(5),
            server_info: ServerInfo {
                tick_hz: 128,
                tuning: MoveTuning::default(),
                map: BrushWorld::test_course().to_map(),
            },
        };
        let expected = welcome.clone();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let hello = conn.recv().await.unwrap();
            assert_eq!(
                hello,
                NetMsg::Hello {
                    protocol: PROTOCOL_VERSION
                }
            );
            conn.send(&welcome).await.unwrap();
        });

        let mut client = ReliableConn::connect(addr).await.unwrap();
        client
            .send(&NetMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await
            .unwrap();
        let got = client.recv().await.unwrap();
        server.await.unwrap();

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn idle_reliable_recv_times_out() {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = ReliableListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut client = ReliableConn::connect(addr).await.unwrap();
        let _server_side = accept.await.unwrap();
        let got = client
            .recv_timeout(std::time::Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
