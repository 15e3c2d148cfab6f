//! Client-side prediction and reconciliation.
//!
//! The client runs its own commands through the same movement kernel the
//! server uses, so the local player responds without waiting a round trip.
//! Every predicted command is remembered together with the state it produced.
//! When a snapshot acknowledges a command, the remembered state is compared
//! with the server's; on a mismatch the server state is adopted and every
//! later command is replayed on top of it.

use std::collections::VecDeque;

use pmove_shared::{
    config::PredictionConfig,
    net::UserCmd,
    pmove::{player_move, MoveOutcome, MoveTuning, PlayerMove},
    world::BrushWorld,
};
use tracing::debug;

/// A predicted command and the state right after it.
#[derive(Debug, Clone)]
struct Predicted {
    cmd: UserCmd,
    after: PlayerMove,
}

/// What a snapshot did to the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// The acknowledged command was predicted correctly.
    Confirmed,
    /// The prediction was wrong (or unknown) and `replayed` commands were
    /// re-run on top of the server state.
    Corrected { replayed: usize },
    /// The snapshot acknowledged nothing newer than an earlier one.
    Stale,
}

/// Running prediction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionStats {
    pub predicted: u64,
    pub confirmed: u64,
    pub corrections: u64,
    pub replayed: u64,
}

/// Owns the locally predicted player.
pub struct Predictor {
    pm: PlayerMove,
    tuning: MoveTuning,
    world: BrushWorld,
    frame_time: f32,
    history: VecDeque<Predicted>,
    capacity: usize,
    tolerance: f32,
    last_ack: u32,
    stats: PredictionStats,
}

impl Predictor {
    /// Starts predicting from `spawn`, which should be a server state.
    pub fn new(
        spawn: PlayerMove,
        tuning: MoveTuning,
        world: BrushWorld,
        tick_hz: u32,
        config: &PredictionConfig,
    ) -> Self {
        let capacity = config.history.max(1);
        Self {
            pm: spawn,
            tuning,
            world,
            frame_time: 1.0 / tick_hz.max(1) as f32,
            history: VecDeque::with_capacity(capacity),
            capacity,
            tolerance: config.tolerance,
            last_ack: 0,
            stats: PredictionStats::default(),
        }
    }

    /// Current predicted state.
    pub fn state(&self) -> &PlayerMove {
        &self.pm
    }

    pub fn tuning(&self) -> &MoveTuning {
        &self.tuning
    }

    pub fn world(&self) -> &BrushWorld {
        &self.world
    }

    pub fn stats(&self) -> PredictionStats {
        self.stats
    }

    /// Commands predicted but not yet acknowledged.
    pub fn unacknowledged(&self) -> usize {
        self.history.len()
    }

    /// Swaps tuning. Takes effect from the next predicted command; commands
    /// already in flight are fixed up by reconciliation.
    pub fn set_tuning(&mut self, tuning: MoveTuning) {
        self.tuning = tuning;
    }

    /// Runs one command locally.
    pub fn predict(&mut self, cmd: UserCmd) -> MoveOutcome {
        cmd.apply(&mut self.pm, self.frame_time);
        let outcome = player_move(&mut self.pm, &self.tuning, &self.world);

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Predicted {
            cmd,
            after: self.pm.clone(),
        });
        self.stats.predicted += 1;
        outcome
    }

    /// Folds in the server's state after command `ack`.
    pub fn reconcile(&mut self, ack: u32, authoritative: &PlayerMove) -> Reconcile {
        // Ack 0 means the server has not run a command yet; with commands in
        // flight there is nothing to check against.
        let nothing_new = if ack == 0 {
            !self.history.is_empty()
        } else {
            ack <= self.last_ack
        };
        if nothing_new {
            return Reconcile::Stale;
        }
        self.last_ack = ack;

        while self
            .history
            .front()
            .is_some_and(|entry| entry.cmd.sequence < ack)
        {
            self.history.pop_front();
        }

        let matched = match self.history.front() {
            Some(entry) if entry.cmd.sequence == ack => {
                let ok = self.agrees(&entry.after, authoritative);
                self.history.pop_front();
                ok
            }
            // Nothing predicted yet: only the server state is known.
            _ if ack == 0 => self.agrees(&self.pm, authoritative),
            // The acknowledged command fell out of the ring.
            _ => false,
        };

        if matched {
            self.stats.confirmed += 1;
            return Reconcile::Confirmed;
        }

        debug!(
            ack,
            server_origin = ?authoritative.origin,
            "prediction diverged, replaying"
        );
        let replayed = self.replay(authoritative);
        self.stats.corrections += 1;
        self.stats.replayed += replayed as u64;
        Reconcile::Corrected { replayed }
    }

    /// Adopts `base` and re-runs every remembered command on top of it.
    fn replay(&mut self, base: &PlayerMove) -> usize {
        self.pm = base.clone();
        for entry in self.history.iter_mut() {
            entry.cmd.apply(&mut self.pm, self.frame_time);
            player_move(&mut self.pm, &self.tuning, &self.world);
            entry.after = self.pm.clone();
        }
        self.history.len()
    }

    fn agrees(&self, predicted: &PlayerMove, authoritative: &PlayerMove) -> bool {
        if self.tolerance == 0.0 {
            return predicted == authoritative;
        }
        (predicted.origin - authoritative.origin).length() <= self.tolerance
            && (predicted.velocity - authoritative.velocity).length() <= self.tolerance
            && predicted.flags == authoritative.flags
            && predicted.use_hull == authoritative.use_hull
    }
}
