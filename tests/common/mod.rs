//! Shared fakes for the idle loop tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;
use termdrive_core::core::capture::CaptureKind;
use termdrive_core::core::mode::{
    EngineSwitch, TelnetNegotiator, TelnetOutcome, TelnetStatus, TerminalEngines,
};
use termdrive_core::{
    CaptureError, CommPort, LogSink, ParseContext, PublishChannel, TerminalSize, TransportError,
    TransportType, Yielder,
};

/// In-memory port: tests push bytes into `incoming` and read `sent`
#[derive(Default)]
pub struct PortState {
    pub incoming: VecDeque<u8>,
    pub sent: Vec<u8>,
    pub receive_calls: usize,
    pub closed: bool,
}

#[derive(Clone, Default)]
pub struct LoopbackPort(pub Rc<RefCell<PortState>>);

impl LoopbackPort {
    pub fn push(&self, data: &[u8]) {
        self.0.borrow_mut().incoming.extend(data.iter().copied());
    }

    pub fn sent(&self) -> Vec<u8> {
        self.0.borrow().sent.clone()
    }

    pub fn receive_calls(&self) -> usize {
        self.0.borrow().receive_calls
    }

    pub fn close(&self) {
        self.0.borrow_mut().closed = true;
    }
}

impl CommPort for LoopbackPort {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.0.borrow_mut();
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        state.sent.extend_from_slice(data);
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.0.borrow_mut();
        state.receive_calls += 1;
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        let n = buf.len().min(state.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn connection_info(&self) -> String {
        "loopback".to_string()
    }
}

/// What the fake engines were asked to do
#[derive(Default)]
pub struct EngineLog {
    pub vt_reply: EngineSwitch,
    pub tek_reply: EngineSwitch,
    pub tek: bool,
    pub vt_parses: usize,
    pub tek_parses: usize,
    pub activations: usize,
    pub opens: usize,
    pub resizes: Vec<TerminalSize>,
    pub text: Vec<u8>,
}

/// Engines that read every data byte as text and capture it
#[derive(Clone, Default)]
pub struct RecordingEngines(pub Rc<RefCell<EngineLog>>);

impl RecordingEngines {
    fn parse(&self, ctx: &mut ParseContext<'_>) {
        let mut chunk = Vec::new();
        while let Some(byte) = ctx.read_byte() {
            chunk.push(byte);
        }
        if !chunk.is_empty() {
            ctx.capture_text(&chunk);
            self.0.borrow_mut().text.extend_from_slice(&chunk);
        }
    }
}

impl TerminalEngines for RecordingEngines {
    fn vt_parse(&mut self, ctx: &mut ParseContext<'_>) -> EngineSwitch {
        self.parse(ctx);
        let mut log = self.0.borrow_mut();
        log.vt_parses += 1;
        log.vt_reply
    }

    fn tek_parse(&mut self, ctx: &mut ParseContext<'_>) -> EngineSwitch {
        self.parse(ctx);
        let mut log = self.0.borrow_mut();
        log.tek_parses += 1;
        log.tek_reply
    }

    fn tek_exists(&self) -> bool {
        self.0.borrow().tek
    }

    fn vt_activate(&mut self) {
        self.0.borrow_mut().activations += 1;
    }

    fn vt_open_tek(&mut self) {
        self.0.borrow_mut().opens += 1;
    }

    fn resize_terminal(&mut self, size: TerminalSize) {
        self.0.borrow_mut().resizes.push(size);
    }
}

/// Negotiator that records the status it was handed and stays in it
#[derive(Clone, Default)]
pub struct StallingTelnet(pub Rc<RefCell<Vec<TelnetStatus>>>);

impl TelnetNegotiator for StallingTelnet {
    fn step(&mut self, status: TelnetStatus, _ctx: &mut ParseContext<'_>) -> TelnetOutcome {
        self.0.borrow_mut().push(status);
        TelnetOutcome::next(status)
    }
}

/// Publish channel whose advise flag the test flips
#[derive(Default)]
pub struct PublishState {
    pub advise: bool,
    pub published: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct SharedPublish(pub Rc<RefCell<PublishState>>);

impl SharedPublish {
    pub fn set_advise(&self, advise: bool) {
        self.0.borrow_mut().advise = advise;
    }

    pub fn published(&self) -> Vec<u8> {
        self.0.borrow().published.clone()
    }
}

impl PublishChannel for SharedPublish {
    fn advise_permitted(&self) -> bool {
        self.0.borrow().advise
    }

    fn publish(&mut self, text: &[u8]) -> Result<usize, CaptureError> {
        self.0.borrow_mut().published.extend_from_slice(text);
        Ok(text.len())
    }
}

/// Sink that fails every append and counts the reports it gets
#[derive(Clone, Default)]
pub struct FailingSink(pub Rc<RefCell<usize>>);

impl LogSink for FailingSink {
    fn append(&mut self, _kind: CaptureKind, _bytes: &[u8]) -> Result<usize, CaptureError> {
        Err(CaptureError::Io(io::Error::other("disk full")))
    }

    fn on_error(&mut self, _kind: CaptureKind, _error: &CaptureError) {
        *self.0.borrow_mut() += 1;
    }
}

/// Yielder that only counts
#[derive(Clone, Default)]
pub struct CountingYield(pub Rc<RefCell<Vec<Duration>>>);

impl Yielder for CountingYield {
    fn yield_for(&mut self, delay: Duration) {
        self.0.borrow_mut().push(delay);
    }
}

/// Writer whose contents the test can read back
#[derive(Clone, Default)]
pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
