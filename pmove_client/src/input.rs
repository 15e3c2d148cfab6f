//! Input handling.
//!
//! In a real client this would integrate with windowing, raw mouse/keyboard
//! and action bindings. Here input is either sampled per tick into an
//! [`InputState`] or read from a scripted [`InputTrack`], and either way it
//! becomes one sequenced `UserCmd` per tick.

use anyhow::Context;
use pmove_shared::{math::Vec3, net::UserCmd, pmove::Buttons};
use serde::{Deserialize, Serialize};

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    /// -1 back .. 1 forward.
    pub forward: f32,
    /// -1 left .. 1 right.
    pub right: f32,
    /// -1 down .. 1 up (swimming and ladders).
    pub up: f32,
    /// Degrees; positive looks down.
    pub pitch: f32,
    /// Degrees; 0 faces +x.
    pub yaw: f32,
    pub jump: bool,
    pub duck: bool,
    pub walk: bool,
}

impl InputState {
    pub fn view_angles(&self) -> Vec3 {
        Vec3::new(self.pitch, self.yaw, 0.0)
    }

    pub fn buttons(&self) -> Buttons {
        let mut buttons = Buttons::empty();
        buttons.set(Buttons::JUMP, self.jump);
        buttons.set(Buttons::DUCK, self.duck);
        buttons.set(Buttons::SPEED, self.walk);
        buttons.set(Buttons::FORWARD, self.forward > 0.0);
        buttons.set(Buttons::BACK, self.forward < 0.0);
        buttons.set(Buttons::MOVE_RIGHT, self.right > 0.0);
        buttons.set(Buttons::MOVE_LEFT, self.right < 0.0);
        buttons
    }
}

/// Turns sampled input into the command for `sequence`.
pub fn build_command(sequence: u32, input: InputState) -> UserCmd {
    UserCmd {
        sequence,
        view_angles: input.view_angles(),
        forward_move: input.forward,
        side_move: input.right,
        up_move: input.up,
        buttons: input.buttons(),
    }
}

/// One segment of a scripted track: hold `input` for `ticks` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputStep {
    pub ticks: u32,
    #[serde(flatten)]
    pub input: InputState,
}

/// A named, replayable input script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTrack {
    pub name: String,
    pub steps: Vec<InputStep>,
}

impl InputTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a segment.
    pub fn hold(mut self, ticks: u32, input: InputState) -> Self {
        self.steps.push(InputStep { ticks, input });
        self
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parse input track")
    }

    /// Total ticks in the script.
    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| s.ticks as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-tick input, in order.
    pub fn inputs(&self) -> impl Iterator<Item = InputState> + '_ {
        self.steps
            .iter()
            .flat_map(|s| std::iter::repeat(s.input).take(s.ticks as usize))
    }

    /// The script as commands numbered from 1.
    pub fn commands(&self) -> impl Iterator<Item = UserCmd> + '_ {
        self.inputs()
            .zip(1u32..)
            .map(|(input, sequence)| build_command(sequence, input))
    }
}
