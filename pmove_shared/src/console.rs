//! Console system.
//!
//! Provides:
//! - Typed console variables (cvars), including one `sv_*` cvar per movement
//!   tuning knob
//! - A handful of built-in commands (`echo`, `help`, `cvarlist`, `set`, `reset`)
//! - Change tracking so the server can pick up tuning edits at a tick boundary
//!
//! # Usage
//! ```ignore
//! let mut console = Console::with_movement_cvars(&MoveTuning::default());
//! console.exec("sv_airaccelerate 100")?;
//! if console.take_replicated_changes() {
//!     let tuning = console.tuning();
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};

use anyhow::{bail, Context};
use tracing::debug;

use crate::pmove::MoveTuning;

/// Console variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum CvarValue {
    Int(i64),
    Float(f32),
    Text(String),
}

impl CvarValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            CvarValue::Float(v) => Some(*v),
            CvarValue::Int(v) => Some(*v as f32),
            CvarValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CvarValue::Int(v) => Some(*v),
            CvarValue::Float(v) => Some(*v as i64),
            CvarValue::Text(s) => s.parse().ok(),
        }
    }

    /// Parses `text` into a value of the same kind as `self`.
    fn parse_like(&self, text: &str) -> anyhow::Result<CvarValue> {
        Ok(match self {
            CvarValue::Int(_) => CvarValue::Int(
                text.parse()
                    .with_context(|| format!("expected an integer, got '{text}'"))?,
            ),
            CvarValue::Float(_) => {
                let v: f32 = text
                    .parse()
                    .with_context(|| format!("expected a number, got '{text}'"))?;
                if !v.is_finite() {
                    bail!("value must be finite");
                }
                CvarValue::Float(v)
            }
            CvarValue::Text(_) => CvarValue::Text(text.trim_matches('"').to_string()),
        })
    }
}

impl std::fmt::Display for CvarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvarValue::Int(v) => write!(f, "{}", v),
            CvarValue::Float(v) => write!(f, "{}", v),
            CvarValue::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

bitflags::bitflags! {
    /// Cvar flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        const ARCHIVE = 1 << 0;      // Saved to config
        const REPLICATED = 1 << 1;   // Server -> client
        const SERVER_ONLY = 1 << 2;  // Server-side only
    }
}

/// Console variable metadata.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub value: CvarValue,
    pub default: CvarValue,
    pub description: String,
    pub flags: CvarFlags,
}

/// Command handler function type.
pub type CommandHandler = Box<dyn Fn(&[&str], &mut ConsoleContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Context passed to command handlers.
pub struct ConsoleContext<'a> {
    /// Output lines for the caller.
    pub output: Vec<String>,
    cvars: &'a mut BTreeMap<String, Cvar>,
    replicated_changes: &'a mut u64,
}

impl ConsoleContext<'_> {
    pub fn print(&mut self, msg: impl Into<String>) {
        self.output.push(msg.into());
    }

    pub fn cvar(&self, name: &str) -> Option<&Cvar> {
        self.cvars.get(name)
    }

    /// Parses and stores a cvar value, returning the stored value.
    pub fn set_cvar_text(&mut self, name: &str, text: &str) -> anyhow::Result<CvarValue> {
        set_cvar_text(self.cvars, self.replicated_changes, name, text)
    }
}

fn set_cvar_text(
    cvars: &mut BTreeMap<String, Cvar>,
    replicated_changes: &mut u64,
    name: &str,
    text: &str,
) -> anyhow::Result<CvarValue> {
    let Some(cvar) = cvars.get_mut(name) else {
        bail!("unknown cvar: {}", name);
    };
    let value = cvar.default.parse_like(text)?;
    if cvar.value != value {
        cvar.value = value.clone();
        if cvar.flags.contains(CvarFlags::REPLICATED) {
            *replicated_changes += 1;
        }
        debug!(cvar = name, value = %value, "cvar changed");
    }
    Ok(value)
}

/// The console.
pub struct Console {
    cvars: BTreeMap<String, Cvar>,
    commands: BTreeMap<String, CommandHandler>,
    history: VecDeque<String>,
    max_history: usize,
    replicated_changes: u64,
    seen_changes: u64,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Movement cvar names, each bound to one `MoveTuning` field.
const MOVEMENT_CVARS: &[(&str, &str)] = &[
    ("sv_gravity", "World gravity"),
    ("sv_stopspeed", "Speed below which friction uses a fixed control value"),
    ("sv_maxspeed", "Server cap on player run speed"),
    ("sv_accelerate", "Ground acceleration rate"),
    ("sv_airaccelerate", "Air acceleration rate"),
    ("sv_wateraccelerate", "Swim acceleration rate"),
    ("sv_friction", "Ground friction"),
    ("sv_edgefriction", "Friction multiplier near ledges"),
    ("sv_waterfriction", "Swim drag"),
    ("sv_entgravity", "Player gravity scale"),
    ("sv_stepsize", "Tallest step walked up without jumping"),
    ("sv_maxvelocity", "Per-axis velocity clamp"),
    ("sv_jumpheight", "Jump apex height"),
    ("sv_airspeedcap", "Wish speed cap for air acceleration"),
    ("sv_duckspeed", "Ground speed scale while ducked"),
];

fn tuning_fields(t: &MoveTuning) -> [f32; 15] {
    [
        t.gravity,
        t.stop_speed,
        t.max_speed,
        t.accelerate,
        t.air_accelerate,
        t.water_accelerate,
        t.friction,
        t.edge_friction,
        t.water_friction,
        t.ent_gravity,
        t.step_size,
        t.max_velocity,
        t.jump_height,
        t.air_speed_cap,
        t.duck_speed_multiplier,
    ]
}

impl Console {
    pub fn new() -> Self {
        let mut console = Self {
            cvars: BTreeMap::new(),
            commands: BTreeMap::new(),
            history: VecDeque::new(),
            max_history: 100,
            replicated_changes: 0,
            seen_changes: 0,
        };

        console.register_builtin_commands();
        console
    }

    /// A console with every movement knob registered as a replicated cvar,
    /// defaulting to `tuning`.
    pub fn with_movement_cvars(tuning: &MoveTuning) -> Self {
        let mut console = Self::new();
        for ((name, description), value) in MOVEMENT_CVARS.iter().zip(tuning_fields(tuning)) {
            console.register_cvar(
                name,
                CvarValue::Float(value),
                description,
                CvarFlags::REPLICATED | CvarFlags::ARCHIVE,
            );
        }
        console
    }

    fn register_builtin_commands(&mut self) {
        // echo <text>
        self.register_command("echo", |args, ctx| {
            ctx.print(args.join(" "));
            Ok(())
        });

        // help
        self.register_command("help", |_args, ctx| {
            ctx.print("Type a cvar name to query it, or '<cvar> <value>' to set it.");
            ctx.print("Built-ins: echo, help, cvarlist, set, reset");
            Ok(())
        });

        // cvarlist [prefix]
        self.register_command("cvarlist", |args, ctx| {
            let prefix = args.first().copied().unwrap_or("");
            let lines: Vec<String> = ctx
                .cvars
                .iter()
                .filter(|(name, _)| name.starts_with(prefix))
                .map(|(name, cvar)| {
                    format!(
                        "  {} = {} (default: {}) {}",
                        name, cvar.value, cvar.default, cvar.description
                    )
                })
                .collect();
            let count = lines.len();
            for line in lines {
                ctx.print(line);
            }
            ctx.print(format!("{} cvars", count));
            Ok(())
        });

        // set <cvar> <value>
        self.register_command("set", |args, ctx| {
            if args.len() < 2 {
                bail!("usage: set <cvar> <value>");
            }
            let name = args[0];
            let value = ctx.set_cvar_text(name, &args[1..].join(" "))?;
            ctx.print(format!("{} = {}", name, value));
            Ok(())
        });

        // reset <cvar>
        self.register_command("reset", |args, ctx| {
            let Some(&name) = args.first() else {
                bail!("usage: reset <cvar>");
            };
            let default = ctx
                .cvar(name)
                .map(|c| c.default.clone())
                .with_context(|| format!("unknown cvar: {}", name))?;
            let text = match &default {
                CvarValue::Text(s) => s.clone(),
                other => other.to_string(),
            };
            let value = ctx.set_cvar_text(name, &text)?;
            ctx.print(format!("{} = {}", name, value));
            Ok(())
        });
    }

    /// Registers a console variable.
    pub fn register_cvar(&mut self, name: &str, default: CvarValue, description: &str, flags: CvarFlags) {
        let cvar = Cvar {
            value: default.clone(),
            default,
            description: description.to_string(),
            flags,
        };
        self.cvars.insert(name.to_string(), cvar);
    }

    /// Registers a command.
    pub fn register_command<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str], &mut ConsoleContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    /// Executes a console command line.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(Vec::new());
        }

        self.history.push_back(line.to_string());
        if self.history.len() > self.max_history {
            self.history.pop_front();
        }

        let tokens = parse_command_line(line);
        let Some((cmd_name, rest)) = tokens.split_first() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = rest.iter().map(|s| s.as_str()).collect();

        let mut ctx = ConsoleContext {
            output: Vec::new(),
            cvars: &mut self.cvars,
            replicated_changes: &mut self.replicated_changes,
        };

        // Typing a cvar name queries it; adding a value sets it.
        if !self.commands.contains_key(cmd_name.as_str()) {
            if let Some(cvar) = ctx.cvar(cmd_name) {
                if args.is_empty() {
                    let line = format!("{} = {} (default: {})", cmd_name, cvar.value, cvar.default);
                    ctx.print(line);
                } else {
                    let value = ctx
                        .set_cvar_text(cmd_name, &args.join(" "))
                        .with_context(|| format!("cvar '{}'", cmd_name))?;
                    ctx.print(format!("{} = {}", cmd_name, value));
                }
                return Ok(ctx.output);
            }
        }

        if let Some(handler) = self.commands.get(cmd_name.as_str()) {
            handler(&args, &mut ctx).with_context(|| format!("command '{}'", cmd_name))?;
        } else {
            ctx.print(format!("Unknown command: {}", cmd_name));
        }

        Ok(ctx.output)
    }

    /// Gets a cvar value.
    pub fn get_cvar(&self, name: &str) -> Option<&CvarValue> {
        self.cvars.get(name).map(|c| &c.value)
    }

    /// Sets a cvar value from text.
    pub fn set_cvar(&mut self, name: &str, text: &str) -> anyhow::Result<()> {
        set_cvar_text(&mut self.cvars, &mut self.replicated_changes, name, text).map(|_| ())
    }

    /// Current movement tuning as described by the `sv_*` cvars.
    ///
    /// Cvars that were never registered keep the `MoveTuning` default.
    pub fn tuning(&self) -> MoveTuning {
        let mut values = tuning_fields(&MoveTuning::default());
        for (slot, (name, _)) in values.iter_mut().zip(MOVEMENT_CVARS) {
            if let Some(v) = self.get_cvar(name).and_then(CvarValue::as_float) {
                *slot = v;
            }
        }
        let [gravity, stop_speed, max_speed, accelerate, air_accelerate, water_accelerate, friction, edge_friction, water_friction, ent_gravity, step_size, max_velocity, jump_height, air_speed_cap, duck_speed_multiplier] =
            values;
        MoveTuning {
            gravity,
            stop_speed,
            max_speed,
            accelerate,
            air_accelerate,
            water_accelerate,
            friction,
            edge_friction,
            water_friction,
            ent_gravity,
            step_size,
            max_velocity,
            jump_height,
            air_speed_cap,
            duck_speed_multiplier,
        }
    }

    /// Number of edits to replicated cvars since the console was created.
    pub fn replicated_changes(&self) -> u64 {
        self.replicated_changes
    }

    /// True once per batch of replicated cvar edits.
    pub fn take_replicated_changes(&mut self) -> bool {
        let changed = self.seen_changes != self.replicated_changes;
        self.seen_changes = self.replicated_changes;
        changed
    }

    /// Gets command history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }
}

/// Parses a command line into tokens, respecting quotes.
fn parse_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
