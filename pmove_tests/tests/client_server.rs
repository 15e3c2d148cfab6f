//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use pmove_client::client::ClientState;
use pmove_client::input::InputState;
use pmove_client::GameClient;
use pmove_server::server::bind_ephemeral;
use pmove_shared::config::EngineConfig;
use pmove_shared::net::{
    decode_from_bytes, encode_to_bytes, ClientId, NetMsg, ServerInfo, PROTOCOL_VERSION,
};
use pmove_shared::pmove::MoveTuning;
use pmove_shared::world::BrushWorld;
use tokio::sync::mpsc;

/// Unit-style test: handshake messages survive the wire format.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let hello = NetMsg::Hello {
        protocol: PROTOCOL_VERSION,
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&hello)?)?, hello);

    let welcome = NetMsg::Welcome {
        client_id: ClientId(1),
        server_info: ServerInfo {
            tick_hz: 128,
            tuning: MoveTuning::default(),
            map: BrushWorld::flat_ground().to_map(),
        },
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&welcome)?)?, welcome);
    Ok(())
}

/// Full integration: real server loop, one client predicting against it,
/// a tuning change halfway through and a clean shutdown.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_server_full_roundtrip() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let (mut server, cfg) = bind_ephemeral(EngineConfig::default()).await?;
    let (console_tx, console_rx) = mpsc::channel(8);
    server.set_console_input(console_rx);

    let server_handle = tokio::spawn(async move {
        server.run().await?;
        Ok::<_, anyhow::Error>(server)
    });

    let mut client = GameClient::connect(&EngineConfig {
        player_name: "TestPlayer".to_string(),
        ..cfg.clone()
    })
    .await?;
    assert_eq!(client.state, ClientState::Connected);
    assert_eq!(client.server_info.tick_hz, cfg.tick_hz);

    client.spawn(Duration::from_secs(5)).await?;
    assert_eq!(client.state, ClientState::Playing);

    let run = InputState {
        forward: 1.0,
        ..Default::default()
    };
    let tick = Duration::from_secs_f32(client.server_info.tick_interval());
    let mut last_sequence = 0;
    for n in 0..150 {
        if n == 50 {
            console_tx.send("sv_accelerate 5".to_string()).await?;
        }
        if let Some(cmd) = client.tick(run).await? {
            last_sequence = cmd.sequence;
        }
        client.recv_snapshot(tick).await?;
        client.poll()?;
    }
    assert_eq!(last_sequence, 150);

    // Wait for the server to acknowledge the final command.
    for _ in 0..200 {
        client.recv_snapshot(Duration::from_millis(20)).await?;
        client.poll()?;
        if client.snaps.last_snapshot().map(|s| s.ack) == Some(last_sequence) {
            break;
        }
    }
    let last = client
        .snaps
        .last_snapshot()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no snapshot received"))?;
    assert_eq!(last.ack, last_sequence);

    // Once everything is acknowledged the prediction is the server's state.
    assert_eq!(client.predicted(), Some(&last.local));
    assert!(last.local.origin.x > 100.0, "player did not move: {:?}", last.local.origin);
    assert_eq!(client.server_info.tuning.accelerate, 5.0);

    let stats = client.prediction_stats().ok_or_else(|| anyhow::anyhow!("no predictor"))?;
    assert_eq!(stats.predicted, 150);
    assert!(stats.confirmed > 0);

    console_tx.send("quit".to_string()).await?;
    let server = server_handle.await??;
    assert_eq!(server.sim().tuning().accelerate, 5.0);
    assert!(!server.is_running());

    for _ in 0..50 {
        client.poll()?;
        if client.state == ClientState::Disconnected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.state, ClientState::Disconnected);
    Ok(())
}

/// A client speaking another protocol version is turned away.
#[tokio::test]
async fn protocol_mismatch_is_refused() -> anyhow::Result<()> {
    use pmove_shared::net::ReliableConn;

    let (mut server, cfg) = bind_ephemeral(EngineConfig::default()).await?;
    let accept = tokio::spawn(async move { server.accept_one().await.map(|_| ()) });

    let mut conn = ReliableConn::connect(cfg.server_addr.parse()?).await?;
    conn.send(&NetMsg::Hello {
        protocol: PROTOCOL_VERSION + 1,
    })
    .await?;
    let reply = conn.recv_timeout(Duration::from_secs(5)).await?;
    assert!(matches!(reply, Some(NetMsg::Disconnect { .. })));
    assert!(accept.await?.is_err());
    Ok(())
}
