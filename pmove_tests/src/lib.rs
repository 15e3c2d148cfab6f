//! Shared fixtures for the integration tests and the `parity_runner` binary.
//!
//! A parity run pushes one scripted input track through both ends of the
//! game: the server's [`Simulation`] and the client's [`Predictor`]. Commands
//! can be delayed on their way to the server to mimic latency, which keeps
//! several predicted commands in flight when each snapshot is reconciled.

use std::collections::VecDeque;

use pmove_client::{
    input::{InputState, InputTrack},
    predict::{Predictor, Reconcile},
};
use pmove_server::sim::Simulation;
use pmove_shared::{
    config::PredictionConfig, math::Vec3, net::ClientId, pmove::MoveTuning, world::BrushWorld,
};
use serde::Serialize;
use tracing::debug;

/// Tick rate used by every fixture.
pub const TICK_HZ: u32 = 128;

/// Outcome of one parity run.
#[derive(Debug, Clone, Serialize)]
pub struct ParityResult {
    pub track: String,
    pub ticks: usize,
    pub latency_ticks: usize,
    /// Acks whose prediction disagreed with the server.
    pub mismatches: Vec<u32>,
    pub confirmed: u64,
    pub final_origin: Vec3,
    pub final_speed: f32,
}

impl ParityResult {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Runs `track` through server and client side by side.
pub fn run_parity(
    track: &InputTrack,
    world: &BrushWorld,
    tuning: MoveTuning,
    latency_ticks: usize,
) -> ParityResult {
    let id = ClientId(1);
    let mut sim = Simulation::new(world.clone(), tuning, TICK_HZ);
    let spawn = sim.add_player(id).clone();
    let mut predictor = Predictor::new(
        spawn,
        tuning,
        world.clone(),
        TICK_HZ,
        &PredictionConfig::default(),
    );

    let mut in_flight = VecDeque::new();
    let mut mismatches = Vec::new();
    let mut ticks = 0;

    let step = |sim: &mut Simulation, predictor: &mut Predictor, mismatches: &mut Vec<u32>| {
        sim.run_tick();
        if let Some(snap) = sim.snapshot_for(id) {
            if let Reconcile::Corrected { .. } = predictor.reconcile(snap.ack, &snap.local) {
                mismatches.push(snap.ack);
            }
        }
    };

    for cmd in track.commands() {
        predictor.predict(cmd);
        in_flight.push_back(cmd);
        if in_flight.len() > latency_ticks {
            if let Some(cmd) = in_flight.pop_front() {
                sim.queue_command(id, cmd);
            }
        }
        step(&mut sim, &mut predictor, &mut mismatches);
        ticks += 1;
    }

    // Let the server catch up on whatever is still in flight.
    while let Some(cmd) = in_flight.pop_front() {
        sim.queue_command(id, cmd);
        step(&mut sim, &mut predictor, &mut mismatches);
    }

    let stats = predictor.stats();
    let final_state = predictor.state();
    debug!(
        track = %track.name,
        latency_ticks,
        mismatches = mismatches.len(),
        replayed = stats.replayed,
        "parity run finished"
    );
    ParityResult {
        track: track.name.clone(),
        ticks,
        latency_ticks,
        mismatches,
        confirmed: stats.confirmed,
        final_origin: final_state.origin,
        final_speed: final_state.speed_2d(),
    }
}

fn run(yaw: f32) -> InputState {
    InputState {
        forward: 1.0,
        yaw,
        ..Default::default()
    }
}

/// Turns `degrees` over `ticks` while strafing and holding nothing else,
/// appended as one-tick steps.
fn strafe_turn(
    mut track: InputTrack,
    start_yaw: f32,
    degrees: f32,
    ticks: u32,
    right: f32,
) -> InputTrack {
    for i in 0..ticks {
        let yaw = start_yaw + degrees * (i + 1) as f32 / ticks as f32;
        track = track.hold(
            1,
            InputState {
                right,
                yaw,
                ..Default::default()
            },
        );
    }
    track
}

/// Input scripts covering every movement mode on [`BrushWorld::test_course`].
/// All start from the first spawn point at (0, 0, 36).
pub fn standard_tracks() -> Vec<InputTrack> {
    let idle = InputTrack::new("idle").hold(64, InputState::default());

    let stairs = InputTrack::new("stairs-and-wall").hold(384, run(0.0));

    let bunny = {
        let jump = InputState {
            jump: true,
            ..run(0.0)
        };
        let track = InputTrack::new("strafe-jump")
            .hold(32, run(0.0))
            .hold(1, jump);
        let track = strafe_turn(track, 0.0, 40.0, 40, 1.0);
        let track = track.hold(
            1,
            InputState {
                jump: true,
                yaw: 40.0,
                ..Default::default()
            },
        );
        strafe_turn(track, 40.0, -40.0, 40, -1.0)
    };

    let duck_walk = InputTrack::new("duck-walk")
        .hold(
            96,
            InputState {
                duck: true,
                ..run(-90.0)
            },
        )
        .hold(32, run(-90.0));

    let swim = InputTrack::new("swim")
        .hold(190, run(-135.0))
        .hold(
            64,
            InputState {
                pitch: 60.0,
                ..run(-135.0)
            },
        )
        .hold(
            64,
            InputState {
                up: 1.0,
                yaw: -135.0,
                ..Default::default()
            },
        );

    let ladder = InputTrack::new("ladder")
        .hold(200, run(90.0))
        .hold(
            96,
            InputState {
                pitch: -45.0,
                ..run(90.0)
            },
        )
        .hold(
            1,
            InputState {
                jump: true,
                yaw: 90.0,
                ..Default::default()
            },
        )
        .hold(128, InputState::default());

    vec![idle, stairs, bunny, duck_walk, swim, ladder]
}
