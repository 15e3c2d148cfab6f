//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p pmove_client -- [--config pmove.json] [--addr 127.0.0.1:40000]
//!                                [--name Player] [--script track.json]
//!
//! The client connects to the server, builds the server's map locally,
//! predicts its own movement and sends one command per server tick. Without a
//! keyboard backend, input comes from `--script` (looped) or stands still.
//!
//! Console commands:
//!   status          - Show client status and prediction counters
//!   disconnect      - Leave the server
//!   cl_cmdbackup N  - Commands resent per datagram
//!   quit            - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use pmove_client::client::{ClientState, GameClient};
use pmove_client::input::{InputState, InputTrack};
use pmove_shared::config::EngineConfig;
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    cfg: EngineConfig,
    script: Option<InputTrack>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };
    let mut script = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--script" if i + 1 < args.len() => {
                let path = &args[i + 1];
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read script {}", path))?;
                script = Some(InputTrack::from_json_str(&text)?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, script })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, script } = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    client.spawn(Duration::from_secs(5)).await.context("spawn")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client spawned. Type 'status' for info, 'quit' to exit.");
    println!();

    let scripted: Vec<InputState> = script.map(|t| t.inputs().collect()).unwrap_or_default();
    let mut frame = 0usize;

    let tick_interval = Duration::from_secs_f32(client.server_info.tick_interval());
    let mut next_tick = tokio::time::Instant::now();

    loop {
        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            if matches!(line.as_str(), "quit" | "exit") {
                client.disconnect("user quit").await?;
                return Ok(());
            }
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => {
                    println!("Error: {:#}", e);
                }
            }
        }

        client.poll()?;
        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }

        let input = if scripted.is_empty() {
            InputState::default()
        } else {
            scripted[frame % scripted.len()]
        };
        frame += 1;
        client.tick(input).await?;

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    Ok(())
}
