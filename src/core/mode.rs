//! Protocol mode dispatcher
//!
//! Each cycle hands the inbound stream to exactly one consumer, in priority
//! order: the Telnet negotiator while a command is in flight, then a
//! transfer-protocol dialog if one owns the stream, then the active terminal
//! engine (VT or TEK). Engine handoff requests are resolved by [`transition`].

use crate::core::scheduler::Yielder;
use crate::core::session::ParseContext;
use crate::core::terminal::TerminalSize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Telnet negotiation status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TelnetStatus {
    /// No command in flight
    #[default]
    Idle,
    /// An IAC was seen and the negotiator has not started on it
    NegotiationPending,
    /// Waiting for the command byte or its option
    Command,
    /// Inside a subnegotiation payload
    Subnegotiation,
    /// Saw IAC inside a subnegotiation
    SubnegotiationIac,
}

/// Terminal engine currently consuming the stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveEngine {
    /// Text terminal
    #[default]
    Vt,
    /// Tektronix graphics terminal
    Tek,
}

impl fmt::Display for ActiveEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vt => write!(f, "VT"),
            Self::Tek => write!(f, "TEK"),
        }
    }
}

/// Handoff request returned by an engine parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EngineSwitch {
    /// Keep the current engine
    #[default]
    NoChange,
    /// Hand the stream to the VT engine
    SwitchToVt,
    /// Hand the stream to the TEK engine
    SwitchToTek,
}

/// Action the dispatcher takes after an engine parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Leave the active engine as it is
    Stay,
    /// Activate VT, tearing TEK down first if it was active
    ActivateVt,
    /// Let VT open the TEK engine and make it active
    OpenTek,
}

/// Resolve a handoff request.
///
/// `tek_exists` is whether the TEK instance is alive. An active TEK whose
/// instance is gone always falls back to VT, and a switch to TEK without an
/// instance is ignored.
pub fn transition(active: ActiveEngine, switch: EngineSwitch, tek_exists: bool) -> Transition {
    match (active, switch) {
        (ActiveEngine::Tek, _) if !tek_exists => Transition::ActivateVt,
        (ActiveEngine::Tek, EngineSwitch::SwitchToVt) => Transition::ActivateVt,
        (ActiveEngine::Vt, EngineSwitch::SwitchToTek) if tek_exists => Transition::OpenTek,
        _ => Transition::Stay,
    }
}

/// What a negotiator step produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelnetOutcome {
    /// Status for the next cycle
    pub next: TelnetStatus,
    /// The peer asked for a new terminal size
    pub resize: Option<TerminalSize>,
}

impl TelnetOutcome {
    /// Outcome with no size change
    pub fn next(next: TelnetStatus) -> Self {
        Self { next, resize: None }
    }

    /// Outcome that also resizes the terminal
    pub fn resized(next: TelnetStatus, size: TerminalSize) -> Self {
        Self {
            next,
            resize: Some(size),
        }
    }
}

/// Telnet option negotiation
pub trait TelnetNegotiator {
    /// Consume Telnet command bytes starting from `status`
    fn step(&mut self, status: TelnetStatus, ctx: &mut ParseContext<'_>) -> TelnetOutcome;
}

/// Transfer-protocol dialog (XMODEM, ZMODEM, ...) that owns the stream
pub trait ProtocolDialog {
    /// Run one parse step. Clearing `protocol_dialog` ends the dialog.
    fn parse(&mut self, ctx: &mut ParseContext<'_>);
}

/// The VT and TEK terminal engines
pub trait TerminalEngines {
    /// Parse inbound bytes with the VT engine
    fn vt_parse(&mut self, ctx: &mut ParseContext<'_>) -> EngineSwitch;

    /// Parse inbound bytes with the TEK engine
    fn tek_parse(&mut self, ctx: &mut ParseContext<'_>) -> EngineSwitch;

    /// Whether a TEK instance exists
    fn tek_exists(&self) -> bool;

    /// Make VT the active engine, tearing down TEK if needed
    fn vt_activate(&mut self);

    /// Ask VT to open (or raise) the TEK engine
    fn vt_open_tek(&mut self);

    /// Apply a new terminal size. Called with the terminal lock held.
    fn resize_terminal(&mut self, size: TerminalSize);
}

/// Dialog stand-in for sessions without transfer protocols
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDialog;

impl ProtocolDialog for NoDialog {
    fn parse(&mut self, ctx: &mut ParseContext<'_>) {
        tracing::debug!("no protocol dialog available, returning stream to terminal");
        ctx.session_mut().protocol_dialog = false;
    }
}

/// Which consumer ran in a dispatch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The Telnet negotiator ran
    Negotiated {
        /// Status after the step
        status: TelnetStatus,
        /// Whether the terminal was resized
        resized: bool,
    },
    /// The protocol dialog ran
    Dialog,
    /// A terminal engine ran
    Parsed {
        /// Engine that parsed
        engine: ActiveEngine,
        /// Resulting handoff
        transition: Transition,
    },
}

/// Routes each cycle's parse to one consumer and owns the mode state
pub struct ModeDispatcher {
    telnet_status: TelnetStatus,
    active: ActiveEngine,
    terminal_lock: Arc<Mutex<()>>,
    vt_yield: Duration,
    tek_throttle: Duration,
}

impl Default for ModeDispatcher {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_millis(1))
    }
}

impl ModeDispatcher {
    /// Dispatcher yielding `vt_yield` after VT parses and `tek_throttle` after TEK parses
    pub fn new(vt_yield: Duration, tek_throttle: Duration) -> Self {
        Self {
            telnet_status: TelnetStatus::Idle,
            active: ActiveEngine::Vt,
            terminal_lock: Arc::new(Mutex::new(())),
            vt_yield,
            tek_throttle,
        }
    }

    /// Current Telnet status
    pub fn telnet_status(&self) -> TelnetStatus {
        self.telnet_status
    }

    /// Engine currently consuming the stream
    pub fn active_engine(&self) -> ActiveEngine {
        self.active
    }

    /// Terminal-buffer lock, shareable with a renderer
    pub fn terminal_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.terminal_lock)
    }

    /// Run one parse step
    pub fn dispatch(
        &mut self,
        ctx: &mut ParseContext<'_>,
        telnet: &mut dyn TelnetNegotiator,
        dialog: &mut dyn ProtocolDialog,
        engines: &mut dyn TerminalEngines,
        yielder: &mut dyn Yielder,
    ) -> DispatchOutcome {
        if self.telnet_status == TelnetStatus::Idle && ctx.session().telnet_mode {
            tracing::debug!("telnet command pending");
            self.telnet_status = TelnetStatus::NegotiationPending;
        }

        if self.telnet_status != TelnetStatus::Idle {
            let outcome = telnet.step(self.telnet_status, ctx);
            self.telnet_status = outcome.next;
            if outcome.next == TelnetStatus::Idle {
                ctx.session_mut().telnet_mode = false;
            }
            if let Some(size) = outcome.resize {
                let _buffer = self.terminal_lock.lock();
                tracing::debug!(cols = size.cols, rows = size.rows, "terminal resize");
                engines.resize_terminal(size);
            }
            return DispatchOutcome::Negotiated {
                status: outcome.next,
                resized: outcome.resize.is_some(),
            };
        }

        if ctx.session().protocol_dialog {
            dialog.parse(ctx);
            return DispatchOutcome::Dialog;
        }

        let engine = self.active;
        let switch = match engine {
            ActiveEngine::Vt => {
                let switch = engines.vt_parse(ctx);
                yielder.yield_for(self.vt_yield);
                switch
            }
            ActiveEngine::Tek if engines.tek_exists() => {
                let switch = engines.tek_parse(ctx);
                yielder.yield_for(self.tek_throttle);
                switch
            }
            ActiveEngine::Tek => EngineSwitch::SwitchToVt,
        };

        let transition = transition(engine, switch, engines.tek_exists());
        match transition {
            Transition::Stay => {
                if switch != EngineSwitch::NoChange {
                    tracing::debug!(?switch, active = %engine, "handoff ignored");
                }
            }
            Transition::ActivateVt => {
                tracing::debug!(from = %engine, "activating VT");
                engines.vt_activate();
                self.active = ActiveEngine::Vt;
            }
            Transition::OpenTek => {
                tracing::debug!("opening TEK");
                engines.vt_open_tek();
                self.active = ActiveEngine::Tek;
            }
        }

        DispatchOutcome::Parsed { engine, transition }
    }
}
