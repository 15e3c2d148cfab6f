//! Authoritative simulation.
//!
//! Owns every player's movement context and runs client commands through the
//! movement kernel. Nothing here touches sockets or the wall clock, so a tick
//! can be driven from the network loop, a test, or a replay tool alike.
//!
//! Determinism notes:
//! - Players live in a `BTreeMap` so every tick visits them in the same order.
//! - Tuning changes wait for the next tick boundary.
//! - Every command runs with the same `1 / tick_hz` frame time.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use pmove_shared::{
    net::{ClientId, PlayerState, Snapshot, UserCmd},
    pmove::{player_move, FallImpact, MoveTuning, PlayerFlags, PlayerMove},
    world::BrushWorld,
};
use tracing::{debug, info};

/// Commands buffered per player before the oldest are dropped.
pub const MAX_PENDING_CMDS: usize = 128;

/// Commands run per player per tick. Lets a client that fell behind catch up
/// without letting one burst stall the tick.
pub const MAX_CMDS_PER_TICK: usize = 8;

/// Health a player spawns with.
pub const SPAWN_HEALTH: f32 = 100.0;

/// One player's server-side state.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub pm: PlayerMove,
    pub health: f32,
    pending: VecDeque<UserCmd>,
    /// Newest sequence accepted into `pending`.
    last_queued: u32,
    /// Sequence of the last command run through the kernel.
    last_processed: u32,
}

impl PlayerSlot {
    fn new(pm: PlayerMove) -> Self {
        Self {
            pm,
            health: SPAWN_HEALTH,
            pending: VecDeque::new(),
            last_queued: 0,
            last_processed: 0,
        }
    }

    pub fn last_processed(&self) -> u32 {
        self.last_processed
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// A landing reported by the kernel this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallEvent {
    pub client_id: ClientId,
    pub impact: FallImpact,
    /// The landing took the player's health to zero.
    pub fatal: bool,
}

/// What one call to [`Simulation::run_tick`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: u32,
    pub commands_run: usize,
    /// New tuning took effect at the start of this tick.
    pub tuning_changed: bool,
    pub falls: Vec<FallEvent>,
}

/// Server-side world: geometry, tuning and players.
pub struct Simulation {
    world: BrushWorld,
    tuning: MoveTuning,
    pending_tuning: Option<MoveTuning>,
    tick_hz: u32,
    tick: u32,
    players: BTreeMap<ClientId, PlayerSlot>,
    spawns_handed_out: usize,
}

impl Simulation {
    pub fn new(world: BrushWorld, tuning: MoveTuning, tick_hz: u32) -> Self {
        Self {
            world,
            tuning,
            pending_tuning: None,
            tick_hz: tick_hz.max(1),
            tick: 0,
            players: BTreeMap::new(),
            spawns_handed_out: 0,
        }
    }

    pub fn world(&self) -> &BrushWorld {
        &self.world
    }

    pub fn tuning(&self) -> &MoveTuning {
        &self.tuning
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Seconds each command simulates.
    pub fn frame_time(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Queues new tuning for the next tick boundary.
    pub fn set_tuning(&mut self, tuning: MoveTuning) {
        self.pending_tuning = Some(tuning);
    }

    /// Spawns a player at the next spawn point. Re-adding an existing client
    /// respawns it.
    pub fn add_player(&mut self, client_id: ClientId) -> &PlayerMove {
        let origin = self.world.spawn_point(self.spawns_handed_out);
        self.spawns_handed_out += 1;

        let pm = PlayerMove::spawn(origin, self.tuning.max_speed);
        let slot = self
            .players
            .entry(client_id)
            .or_insert_with(|| PlayerSlot::new(PlayerMove::default()));
        // Sequence bookkeeping survives a respawn so old commands stay stale.
        *slot = PlayerSlot {
            last_queued: slot.last_queued,
            last_processed: slot.last_processed,
            ..PlayerSlot::new(pm)
        };
        info!(client_id = ?client_id, origin = ?slot.pm.origin, "player spawned");
        &slot.pm
    }

    pub fn remove_player(&mut self, client_id: ClientId) -> bool {
        self.players.remove(&client_id).is_some()
    }

    pub fn player(&self, client_id: ClientId) -> Option<&PlayerSlot> {
        self.players.get(&client_id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&ClientId, &PlayerSlot)> {
        self.players.iter()
    }

    /// Queues one command. Commands at or below the newest accepted sequence
    /// are repeats and are dropped. Returns whether the command was queued.
    pub fn queue_command(&mut self, client_id: ClientId, cmd: UserCmd) -> bool {
        let Some(slot) = self.players.get_mut(&client_id) else {
            return false;
        };
        if cmd.sequence <= slot.last_queued {
            return false;
        }
        slot.last_queued = cmd.sequence;
        slot.pending.push_back(cmd);
        while slot.pending.len() > MAX_PENDING_CMDS {
            if let Some(dropped) = slot.pending.pop_front() {
                debug!(client_id = ?client_id, sequence = dropped.sequence, "command queue full, dropping oldest");
            }
        }
        true
    }

    /// Queues a batch, oldest first. Returns how many were new.
    pub fn queue_commands(&mut self, client_id: ClientId, cmds: &[UserCmd]) -> usize {
        cmds.iter()
            .filter(|cmd| self.queue_command(client_id, **cmd))
            .count()
    }

    /// Marks a player dead. The kernel stops moving it until respawn.
    pub fn kill(&mut self, client_id: ClientId) -> bool {
        let Some(slot) = self.players.get_mut(&client_id) else {
            return false;
        };
        slot.health = 0.0;
        slot.pm.dead = true;
        true
    }

    /// Toggles the frozen flag. Returns the new state.
    pub fn toggle_frozen(&mut self, client_id: ClientId) -> Option<bool> {
        let slot = self.players.get_mut(&client_id)?;
        slot.pm.flags.toggle(PlayerFlags::FROZEN);
        Some(slot.pm.flags.contains(PlayerFlags::FROZEN))
    }

    /// Runs one tick: applies pending tuning, then up to
    /// [`MAX_CMDS_PER_TICK`] queued commands per player.
    pub fn run_tick(&mut self) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        if let Some(tuning) = self.pending_tuning.take() {
            report.tuning_changed = tuning != self.tuning;
            self.tuning = tuning;
        }

        let frame_time = self.frame_time();
        for (client_id, slot) in self.players.iter_mut() {
            for _ in 0..MAX_CMDS_PER_TICK {
                let Some(cmd) = slot.pending.pop_front() else {
                    break;
                };
                cmd.apply(&mut slot.pm, frame_time);
                let outcome = player_move(&mut slot.pm, &self.tuning, &self.world);
                slot.last_processed = cmd.sequence;
                report.commands_run += 1;

                if let Some(impact) = outcome.fall {
                    slot.health = (slot.health - impact.damage).max(0.0);
                    let fatal = slot.health <= 0.0 && !slot.pm.dead;
                    if fatal {
                        slot.pm.dead = true;
                    }
                    debug!(client_id = ?client_id, damage = impact.damage, health = slot.health, "fall damage");
                    report.falls.push(FallEvent {
                        client_id: *client_id,
                        impact,
                        fatal,
                    });
                }
            }
        }

        self.tick = self.tick.wrapping_add(1);
        report
    }

    /// Snapshot as seen by `client_id`.
    pub fn snapshot_for(&self, client_id: ClientId) -> Option<Snapshot> {
        let slot = self.players.get(&client_id)?;
        let players = self
            .players
            .iter()
            .filter(|(id, _)| **id != client_id)
            .map(|(id, other)| PlayerState::from_move(*id, &other.pm))
            .collect();
        Some(Snapshot {
            tick: self.tick,
            ack: slot.last_processed,
            local: slot.pm.clone(),
            players,
        })
    }
}

/// Fixed-step accumulator for driving ticks from wall-clock time.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
}

impl FixedStep {
    /// Longest frame folded into the accumulator. A stall longer than this is
    /// dropped rather than replayed as a burst of ticks.
    pub const MAX_FRAME: Duration = Duration::from_millis(250);

    pub fn new(tick_hz: u32) -> Self {
        Self {
            step: Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1))),
            accumulator: Duration::ZERO,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Adds elapsed time and returns how many ticks are now due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed.min(Self::MAX_FRAME);
        let mut due = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            due += 1;
        }
        due
    }

    /// Fraction of a tick left in the accumulator, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }
}
