//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p pmove_server -- [--config pmove.json] [--addr 127.0.0.1:40000]
//!                                [--tick-hz 128] [--map maps/course.json]
//!
//! The server listens for client connections, runs the movement kernel on a
//! fixed tick, and sends every client its own snapshot.
//!
//! Console commands:
//!   status          - Show server status
//!   kill <id>       - Kill a player
//!   freeze <id>     - Toggle a player's frozen flag
//!   respawn <id>    - Respawn a player
//!   cvarlist [sv_]  - List cvars; `<cvar> <value>` sets one
//!   quit            - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use pmove_server::server::GameServer;
use pmove_shared::config::EngineConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<EngineConfig> {
    let args: Vec<String> = env::args().collect();

    // The config file is the base; flags after it override single fields.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            "--map" if i + 1 < args.len() => {
                cfg.map = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, map = ?cfg.map, "Starting server");

    let mut server = GameServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

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

    println!("Server ready. Type 'status' for info, 'cvarlist sv_' for tuning, 'quit' to exit.");
    println!();

    server.run().await
}
