//! Terminal size and the pass-through terminal engine

use crate::core::mode::{EngineSwitch, TerminalEngines};
use crate::core::session::ParseContext;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Terminal size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Columns (width)
    pub cols: u16,
    /// Rows (height)
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl TerminalSize {
    /// Create new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// Most bytes one parse call consumes
const PARSE_CHUNK: usize = 4096;

/// VT-side engine that copies the stream to a writer without interpreting it.
///
/// There is no TEK engine behind it, so every handoff stays on VT.
pub struct RawTerminal<W: Write> {
    out: W,
    size: TerminalSize,
    chunk: Vec<u8>,
    bytes_out: u64,
}

impl<W: Write> RawTerminal<W> {
    /// Engine writing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out,
            size: TerminalSize::default(),
            chunk: Vec::with_capacity(PARSE_CHUNK),
            bytes_out: 0,
        }
    }

    /// Current size
    pub fn size(&self) -> TerminalSize {
        self.size
    }

    /// Bytes written to the output so far
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// The output writer
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Consume the engine, returning the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TerminalEngines for RawTerminal<W> {
    fn vt_parse(&mut self, ctx: &mut ParseContext<'_>) -> EngineSwitch {
        self.chunk.clear();
        while self.chunk.len() < PARSE_CHUNK {
            match ctx.read_byte() {
                Some(byte) => self.chunk.push(byte),
                None => break,
            }
        }
        if self.chunk.is_empty() {
            return EngineSwitch::NoChange;
        }

        ctx.capture_text(&self.chunk);
        match self.out.write_all(&self.chunk).and_then(|()| self.out.flush()) {
            Ok(()) => self.bytes_out += self.chunk.len() as u64,
            Err(e) => tracing::warn!("Terminal output failed: {}", e),
        }
        EngineSwitch::NoChange
    }

    fn tek_parse(&mut self, _ctx: &mut ParseContext<'_>) -> EngineSwitch {
        EngineSwitch::SwitchToVt
    }

    fn tek_exists(&self) -> bool {
        false
    }

    fn vt_activate(&mut self) {}

    fn vt_open_tek(&mut self) {
        tracing::debug!("raw terminal has no TEK engine");
    }

    fn resize_terminal(&mut self, size: TerminalSize) {
        self.size = size;
    }
}
