//! Idle scheduler
//!
//! [`IdleCore`] is the whole per-idle pipeline. The host calls
//! [`IdleCore::on_idle`] whenever it has nothing else to do and keeps
//! calling it while it returns `true`. One call runs at most one cycle:
//!
//! 1. lock the capture rings for the cycle
//! 2. send one outbound batch
//! 3. hand the inbound stream to one parser
//! 4. drain the captures to file and publish channel, then unlock them
//! 5. advance the active transfer by one unit
//! 6. receive one inbound batch, unless published text is still pending
//!
//! Nothing here blocks, spawns, or arms a timer.

use crate::config::AppConfig;
use crate::core::capture::dispatch::dispatch as dispatch_captures;
use crate::core::capture::{
    CaptureKind, CaptureScope, DispatchReport, LogSink, NoPublish, NullSink, PublishChannel,
};
use crate::core::mode::{
    DispatchOutcome, ModeDispatcher, NoDialog, ProtocolDialog, TelnetNegotiator, TerminalEngines,
};
use crate::core::session::{ParseContext, SessionState};
use crate::core::telnet::BasicNegotiator;
use crate::core::terminal::RawTerminal;
use crate::core::transfer::TransferDriver;
use crate::core::transport::{CommPort, CommunicationPump, ReceiveOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Countdown of idle cycles before the host may stop re-invoking.
///
/// Reset to the ceiling on activity, decremented otherwise, never below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyCounter {
    count: u32,
    ceiling: u32,
}

impl Default for BusyCounter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl BusyCounter {
    /// Counter starting at `ceiling`
    pub fn new(ceiling: u32) -> Self {
        Self {
            count: ceiling,
            ceiling,
        }
    }

    /// Back to the ceiling
    pub fn reset(&mut self) {
        self.count = self.ceiling;
    }

    /// One idle cycle passed
    pub fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    /// Whether the host should call again soon
    pub fn is_busy(&self) -> bool {
        self.count > 0
    }

    /// Current value
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Ceiling value
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

/// Gives the processor back after a parse
#[cfg_attr(test, mockall::automock)]
pub trait Yielder {
    /// Yield for `delay`. A zero delay only lets other threads run.
    fn yield_for(&mut self, delay: Duration);
}

/// [`Yielder`] backed by the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl Yielder for ThreadYield {
    fn yield_for(&mut self, delay: Duration) {
        if delay.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(delay);
        }
    }
}

/// Which Alt keys act as Meta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaKeyMode {
    /// Alt is never Meta
    #[default]
    Off,
    /// Either Alt key is Meta
    On,
    /// Only the left Alt key is Meta
    Left,
    /// Only the right Alt key is Meta
    Right,
}

/// Alt keys held down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AltKeys {
    /// Left Alt
    pub left: bool,
    /// Right Alt
    pub right: bool,
}

impl MetaKeyMode {
    /// Whether the held Alt keys make this keystroke a Meta keystroke
    pub fn is_meta(self, alt: AltKeys) -> bool {
        match self {
            Self::Off => false,
            Self::On => alt.left || alt.right,
            Self::Left => alt.left,
            Self::Right => alt.right,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Bytes sent
    pub sent: usize,
    /// Parser that ran
    pub parse: DispatchOutcome,
    /// Capture dispatch results
    pub capture: DispatchReport,
    /// Receive result; `None` when the session went down during the cycle
    pub received: Option<ReceiveOutcome>,
}

/// The idle-time dispatch core for one session
pub struct IdleCore {
    session: SessionState,
    port: Box<dyn CommPort>,
    pump: CommunicationPump,
    dispatcher: ModeDispatcher,
    transfers: TransferDriver,
    busy: BusyCounter,
    telnet: Box<dyn TelnetNegotiator>,
    dialog: Box<dyn ProtocolDialog>,
    engines: Box<dyn TerminalEngines>,
    sink: Box<dyn LogSink>,
    publish: Box<dyn PublishChannel>,
    yielder: Box<dyn Yielder>,
    meta_key: MetaKeyMode,
    last_cycle: Option<CycleReport>,
}

impl IdleCore {
    /// Start building a core around `port`
    pub fn builder(port: Box<dyn CommPort>) -> IdleCoreBuilder {
        IdleCoreBuilder::new(port)
    }

    /// Run one idle invocation. Returns whether the host should call again soon.
    pub fn on_idle(&mut self, budget: u32) -> bool {
        if budget == 0 {
            self.busy.reset();
        }

        // Publishing needs an attached channel to drain into
        if self.session.capture.publish && !self.publish.is_active() {
            tracing::warn!(
                session = %self.session.id(),
                "no publish channel attached, publishing disabled"
            );
            self.session.capture.publish = false;
        }

        if self.session.ready {
            self.last_cycle = Some(self.run_cycle());
        }

        if self.session.ready && self.session.pending().any() {
            self.busy.reset();
        } else {
            self.busy.decrement();
        }
        self.busy.is_busy()
    }

    fn run_cycle(&mut self) -> CycleReport {
        let span = tracing::trace_span!("idle_cycle", session = %self.session.id());
        let _enter = span.enter();

        let handles = self.session.captures.clone();
        let mut scope = CaptureScope::new();
        for kind in CaptureKind::ALL {
            scope.acquire(kind, &handles);
        }

        let sent = self.pump.send(&mut self.session, self.port.as_mut());

        let parse = {
            let mut ctx = ParseContext::new(&mut self.session, &mut scope);
            self.dispatcher.dispatch(
                &mut ctx,
                self.telnet.as_mut(),
                self.dialog.as_mut(),
                self.engines.as_mut(),
                self.yielder.as_mut(),
            )
        };

        let capture = dispatch_captures(
            &mut self.session,
            &mut scope,
            self.sink.as_mut(),
            self.publish.as_mut(),
        );
        drop(scope);

        self.transfers.advance(&mut self.session);

        let received = if self.session.ready {
            Some(self.pump.receive(&mut self.session, self.port.as_mut()))
        } else {
            None
        };

        CycleReport {
            sent,
            parse,
            capture,
            received,
        }
    }

    /// Whether the keystroke should bypass accelerator handling because Alt acts as Meta
    pub fn suppresses_accelerators(&self, alt: AltKeys) -> bool {
        self.meta_key.is_meta(alt)
    }

    /// The session
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The session, mutably
    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    /// The transfer driver
    pub fn transfers(&self) -> &TransferDriver {
        &self.transfers
    }

    /// The transfer driver, mutably
    pub fn transfers_mut(&mut self) -> &mut TransferDriver {
        &mut self.transfers
    }

    /// The mode dispatcher
    pub fn dispatcher(&self) -> &ModeDispatcher {
        &self.dispatcher
    }

    /// The busy counter
    pub fn busy(&self) -> BusyCounter {
        self.busy
    }

    /// The pump, for its statistics
    pub fn pump(&self) -> &CommunicationPump {
        &self.pump
    }

    /// Report of the most recent cycle
    pub fn last_cycle(&self) -> Option<&CycleReport> {
        self.last_cycle.as_ref()
    }

    /// Connection description of the port
    pub fn connection_info(&self) -> String {
        self.port.connection_info()
    }
}

/// Builder for [`IdleCore`]
pub struct IdleCoreBuilder {
    port: Box<dyn CommPort>,
    config: AppConfig,
    session: Option<SessionState>,
    telnet: Option<Box<dyn TelnetNegotiator>>,
    dialog: Box<dyn ProtocolDialog>,
    engines: Box<dyn TerminalEngines>,
    sink: Box<dyn LogSink>,
    publish: Box<dyn PublishChannel>,
    yielder: Box<dyn Yielder>,
}

impl IdleCoreBuilder {
    fn new(port: Box<dyn CommPort>) -> Self {
        Self {
            port,
            config: AppConfig::default(),
            session: None,
            telnet: None,
            dialog: Box::new(NoDialog),
            engines: Box::new(RawTerminal::new(std::io::sink())),
            sink: Box::new(NullSink),
            publish: Box::new(NoPublish),
            yielder: Box::new(ThreadYield),
        }
    }

    /// Use `config` for sizes, delays and defaults
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing session instead of establishing one from the config
    #[must_use]
    pub fn session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    /// Telnet negotiator
    #[must_use]
    pub fn telnet(mut self, telnet: Box<dyn TelnetNegotiator>) -> Self {
        self.telnet = Some(telnet);
        self
    }

    /// Transfer-protocol dialog
    #[must_use]
    pub fn dialog(mut self, dialog: Box<dyn ProtocolDialog>) -> Self {
        self.dialog = dialog;
        self
    }

    /// Terminal engines
    #[must_use]
    pub fn engines(mut self, engines: Box<dyn TerminalEngines>) -> Self {
        self.engines = engines;
        self
    }

    /// Capture log sink
    #[must_use]
    pub fn sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Publish channel
    #[must_use]
    pub fn publish(mut self, publish: Box<dyn PublishChannel>) -> Self {
        self.publish = publish;
        self
    }

    /// Processor yield strategy
    #[must_use]
    pub fn yielder(mut self, yielder: Box<dyn Yielder>) -> Self {
        self.yielder = yielder;
        self
    }

    /// Build the core
    pub fn build(self) -> IdleCore {
        let config = self.config;
        let session = self.session.unwrap_or_else(|| {
            let mut session = SessionState::established(&config.capture);
            session.telnet = config.connection.telnet;
            session
        });
        let telnet = self
            .telnet
            .unwrap_or_else(|| Box::new(BasicNegotiator::new(&config.connection.terminal_type)));

        tracing::info!(
            session = %session.id(),
            connection = %self.port.connection_info(),
            "idle core ready"
        );

        IdleCore {
            session,
            port: self.port,
            pump: CommunicationPump::new(&config.comm),
            dispatcher: ModeDispatcher::new(
                Duration::from_millis(config.scheduler.vt_yield_ms),
                Duration::from_millis(config.scheduler.tek_throttle_ms),
            ),
            transfers: TransferDriver::new(config.transfer.unit_size),
            busy: BusyCounter::new(config.scheduler.busy_ceiling),
            telnet,
            dialog: self.dialog,
            engines: self.engines,
            sink: self.sink,
            publish: self.publish,
            yielder: self.yielder,
            meta_key: config.keyboard.meta_key,
            last_cycle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommConfig;
    use crate::core::capture::dispatch::{MockLogSink, MockPublishChannel};
    use crate::core::session::PendingCounts;
    use crate::core::transport::MockCommPort;

    fn quiet_port() -> MockCommPort {
        let mut port = MockCommPort::new();
        port.expect_send().returning(|data| Ok(data.len()));
        port.expect_receive().returning(|_| Ok(0));
        port.expect_connection_info().return_const("mock".to_string());
        port
    }

    fn quiet_core() -> IdleCore {
        let mut yielder = MockYielder::new();
        yielder.expect_yield_for().return_const(());
        IdleCore::builder(Box::new(quiet_port()))
            .yielder(Box::new(yielder))
            .build()
    }

    #[test]
    fn test_busy_counter_floor() {
        let mut busy = BusyCounter::new(2);
        busy.decrement();
        busy.decrement();
        busy.decrement();
        assert_eq!(busy.count(), 0);
        assert!(!busy.is_busy());
        busy.reset();
        assert_eq!(busy.count(), 2);
    }

    #[test]
    fn test_idle_core_winds_down() {
        let mut core = quiet_core();
        assert!(core.on_idle(1));
        assert!(!core.on_idle(2));
        assert!(!core.on_idle(3));
        assert_eq!(core.busy().count(), 0);
    }

    #[test]
    fn test_zero_budget_resets() {
        let mut core = quiet_core();
        core.on_idle(1);
        core.on_idle(2);
        assert!(core.on_idle(0));
    }

    #[test]
    fn test_not_ready_skips_pipeline() {
        let mut port = MockCommPort::new();
        port.expect_send().never();
        port.expect_receive().never();
        port.expect_connection_info().return_const("mock".to_string());

        let mut session = SessionState::new();
        session.queue_outbound(b"never sent");
        let mut core = IdleCore::builder(Box::new(port)).session(session).build();

        assert!(core.on_idle(1));
        assert!(!core.on_idle(2));
        assert!(core.last_cycle().is_none());
    }

    #[test]
    fn test_outbound_keeps_core_busy() {
        let mut port = MockCommPort::new();
        port.expect_send().returning(|_| Ok(0));
        port.expect_receive().returning(|_| Ok(0));
        port.expect_connection_info().return_const("mock".to_string());

        let mut core = IdleCore::builder(Box::new(port))
            .yielder(Box::new(ThreadYield))
            .build();
        core.session_mut().queue_outbound(b"stuck");

        for budget in 1..5 {
            assert!(core.on_idle(budget));
        }
    }

    /// One cycle; the counter must be back at the ceiling afterwards
    fn assert_kept_busy(core: &mut IdleCore) -> PendingCounts {
        assert!(core.on_idle(1));
        assert_eq!(core.busy().count(), core.busy().ceiling());
        core.session().pending()
    }

    fn core_with_input(config: AppConfig, sink: MockLogSink) -> IdleCore {
        let mut core = IdleCore::builder(Box::new(quiet_port()))
            .config(config)
            .sink(Box::new(sink))
            .build();
        core.session_mut().inbound.extend_from_slice(b"x");
        core
    }

    fn stalled_sink() -> MockLogSink {
        let mut sink = MockLogSink::new();
        sink.expect_append().returning(|_, _| Ok(0));
        sink
    }

    #[test]
    fn test_receive_request_keeps_core_busy() {
        let mut port = MockCommPort::new();
        port.expect_receive().returning(|buf| {
            buf.fill(b'x');
            Ok(buf.len())
        });
        port.expect_connection_info().return_const("mock".to_string());
        let mut core = IdleCore::builder(Box::new(port)).build();
        // Everything the full read brings in is discarded
        core.session_mut().discard_inbound(CommConfig::default().receive_batch);

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                receive_requested: true,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_flush_keeps_core_busy() {
        let mut core = IdleCore::builder(Box::new(quiet_port())).build();
        core.session_mut().discard_inbound(5);

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                flush: 5,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_unparsed_inbound_keeps_core_busy() {
        let mut port = MockCommPort::new();
        port.expect_receive().times(1).returning(|buf| {
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        });
        port.expect_connection_info().return_const("mock".to_string());
        let mut core = IdleCore::builder(Box::new(port)).build();

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                inbound: 3,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_text_log_keeps_core_busy() {
        let mut config = AppConfig::default();
        config.capture.file_log = true;
        let mut core = core_with_input(config, stalled_sink());

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                text_log: 1,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_binary_log_keeps_core_busy() {
        let mut config = AppConfig::default();
        config.capture.binary_log = true;
        let mut core = core_with_input(config, stalled_sink());

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                binary_log: 1,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_text_publish_keeps_core_busy() {
        let mut publish = MockPublishChannel::new();
        publish.expect_is_active().return_const(true);
        publish.expect_advise_permitted().return_const(false);
        publish.expect_publish().never();

        let mut config = AppConfig::default();
        config.capture.publish = true;
        let mut core = IdleCore::builder(Box::new(quiet_port()))
            .config(config)
            .publish(Box::new(publish))
            .build();
        core.session_mut().inbound.extend_from_slice(b"x");

        let pending = assert_kept_busy(&mut core);
        assert_eq!(
            pending,
            PendingCounts {
                text_publish: 1,
                ..PendingCounts::default()
            }
        );
    }

    #[test]
    fn test_publish_without_channel_is_disabled() {
        let mut config = AppConfig::default();
        config.capture.publish = true;
        let mut core = core_with_input(config, MockLogSink::new());

        assert!(core.on_idle(1));
        assert!(!core.session().capture.publish);
        assert!(!core.session().pending().any());
        assert!(!core.on_idle(2));
    }

    #[test]
    fn test_meta_key_modes() {
        let left = AltKeys {
            left: true,
            right: false,
        };
        assert!(!MetaKeyMode::Off.is_meta(left));
        assert!(MetaKeyMode::On.is_meta(left));
        assert!(MetaKeyMode::Left.is_meta(left));
        assert!(!MetaKeyMode::Right.is_meta(left));
        assert!(!MetaKeyMode::On.is_meta(AltKeys::default()));
    }

    #[test]
    fn test_suppresses_accelerators_follows_config() {
        let mut config = AppConfig::default();
        config.keyboard.meta_key = MetaKeyMode::Right;
        let core = IdleCore::builder(Box::new(quiet_port())).config(config).build();

        assert!(core.suppresses_accelerators(AltKeys {
            left: false,
            right: true
        }));
        assert!(!core.suppresses_accelerators(AltKeys {
            left: true,
            right: false
        }));
    }
}
