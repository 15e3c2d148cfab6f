//! Interpolation.
//!
//! The server sends discrete snapshots at tick boundaries. Other players are
//! not predicted; the client draws them between the two newest snapshots.

use std::collections::VecDeque;

use pmove_shared::{
    math::Vec3,
    net::{ClientId, PlayerState, Snapshot},
};

/// Buffered snapshot history for interpolation.
#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<Snapshot>,
    max: usize,
}

impl SnapshotBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max: max.max(2),
        }
    }

    /// Adds a snapshot. Snapshots that arrive out of order are dropped.
    pub fn push(&mut self, snap: Snapshot) -> bool {
        if self.history.back().is_some_and(|last| snap.tick <= last.tick) {
            return false;
        }
        self.history.push_back(snap);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
        true
    }

    /// Returns the number of buffered snapshots.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no snapshots are buffered.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Gets an interpolated position for a remote player given a fractional alpha.
    ///
    /// `alpha` should be in $[0,1]$ where 0 = older snapshot, 1 = newer. A
    /// player present only in the newer snapshot is drawn where it is.
    pub fn interp_player(&self, client_id: ClientId, alpha: f32) -> Option<Vec3> {
        let newest = self.history.back()?;
        let b = find_player(newest, client_id)?;
        let older = self
            .history
            .len()
            .checked_sub(2)
            .and_then(|i| self.history.get(i))
            .and_then(|snap| find_player(snap, client_id));
        Some(match older {
            Some(a) => a.origin.lerp(b.origin, alpha),
            None => b.origin,
        })
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.history.back()
    }
}

/// Convenience: find a remote player's state in a snapshot.
pub fn find_player(snap: &Snapshot, client_id: ClientId) -> Option<&PlayerState> {
    snap.players.iter().find(|p| p.client_id == client_id)
}
