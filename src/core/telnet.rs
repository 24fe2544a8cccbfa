//! Built-in Telnet negotiator
//!
//! A small option negotiator for sessions that have no richer one. It
//! accepts the handful of options a plain terminal needs and refuses the
//! rest, answers terminal-type requests, and reports the window size when
//! the server asks for NAWS.

use crate::core::mode::{TelnetNegotiator, TelnetOutcome, TelnetStatus};
use crate::core::session::{ParseContext, IAC};
use crate::core::terminal::TerminalSize;

const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250; // Subnegotiation Begin
const SE: u8 = 240; // Subnegotiation End

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;
const OPT_TERMINAL_TYPE: u8 = 24;
const OPT_NAWS: u8 = 31; // Negotiate About Window Size

const TTYPE_IS: u8 = 0;
const TTYPE_SEND: u8 = 1;

/// Longest subnegotiation payload kept; the rest is dropped
const MAX_SUBNEGOTIATION: usize = 256;

/// Accept-or-refuse Telnet option negotiator
#[derive(Debug, Clone)]
pub struct BasicNegotiator {
    terminal_type: String,
    window: TerminalSize,
    subnegotiation: Vec<u8>,
}

impl Default for BasicNegotiator {
    fn default() -> Self {
        Self::new("xterm")
    }
}

impl BasicNegotiator {
    /// Negotiator announcing `terminal_type`
    pub fn new(terminal_type: &str) -> Self {
        Self {
            terminal_type: terminal_type.to_string(),
            window: TerminalSize::default(),
            subnegotiation: Vec::new(),
        }
    }

    /// Window size reported through NAWS
    #[must_use]
    pub fn window_size(mut self, size: TerminalSize) -> Self {
        self.window = size;
        self
    }

    fn answer_option(&self, ctx: &mut ParseContext<'_>, command: u8, option: u8) {
        let response = match command {
            DO => match option {
                OPT_TERMINAL_TYPE | OPT_NAWS | OPT_SUPPRESS_GO_AHEAD => [IAC, WILL, option],
                _ => [IAC, WONT, option],
            },
            WILL => match option {
                OPT_ECHO | OPT_SUPPRESS_GO_AHEAD => [IAC, DO, option],
                _ => [IAC, DONT, option],
            },
            // DONT and WONT need no answer
            _ => return,
        };
        tracing::debug!(command, option, reply = response[1], "telnet option");
        ctx.write_outbound(&response);

        if command == DO && option == OPT_NAWS {
            let [cols_hi, cols_lo] = self.window.cols.to_be_bytes();
            let [rows_hi, rows_lo] = self.window.rows.to_be_bytes();
            ctx.write_outbound(&[IAC, SB, OPT_NAWS]);
            ctx.write_outbound_escaped(&[cols_hi, cols_lo, rows_hi, rows_lo]);
            ctx.write_outbound(&[IAC, SE]);
        }
    }

    fn finish_subnegotiation(&mut self, ctx: &mut ParseContext<'_>) {
        if self.subnegotiation.as_slice() == [OPT_TERMINAL_TYPE, TTYPE_SEND] {
            let mut reply = vec![IAC, SB, OPT_TERMINAL_TYPE, TTYPE_IS];
            reply.extend_from_slice(self.terminal_type.as_bytes());
            reply.extend_from_slice(&[IAC, SE]);
            ctx.write_outbound(&reply);
        }
        self.subnegotiation.clear();
    }
}

impl TelnetNegotiator for BasicNegotiator {
    fn step(&mut self, status: TelnetStatus, ctx: &mut ParseContext<'_>) -> TelnetOutcome {
        let mut status = status;

        while status != TelnetStatus::Idle {
            status = match status {
                TelnetStatus::Idle => break,
                TelnetStatus::NegotiationPending => match ctx.read_raw() {
                    Some(IAC) => TelnetStatus::Command,
                    Some(_) => TelnetStatus::Idle,
                    None => break,
                },
                TelnetStatus::Command => {
                    let inbound = ctx.inbound();
                    let Some(&command) = inbound.first() else {
                        break;
                    };
                    match command {
                        DO | DONT | WILL | WONT => {
                            let Some(&option) = inbound.get(1) else {
                                break;
                            };
                            ctx.consume_inbound(2);
                            self.answer_option(ctx, command, option);
                        }
                        SB => {
                            ctx.consume_inbound(1);
                            self.subnegotiation.clear();
                            status = TelnetStatus::Subnegotiation;
                            continue;
                        }
                        // Second half of an escaped 0xFF split across receives
                        IAC => {
                            ctx.consume_inbound(1);
                            ctx.push_data_iac();
                        }
                        _ => ctx.consume_inbound(1),
                    }
                    TelnetStatus::Idle
                }
                TelnetStatus::Subnegotiation => match ctx.read_raw() {
                    Some(IAC) => TelnetStatus::SubnegotiationIac,
                    Some(byte) => {
                        if self.subnegotiation.len() < MAX_SUBNEGOTIATION {
                            self.subnegotiation.push(byte);
                        }
                        TelnetStatus::Subnegotiation
                    }
                    None => break,
                },
                TelnetStatus::SubnegotiationIac => match ctx.read_raw() {
                    Some(SE) => {
                        self.finish_subnegotiation(ctx);
                        TelnetStatus::Idle
                    }
                    Some(IAC) => {
                        self.subnegotiation.push(IAC);
                        TelnetStatus::Subnegotiation
                    }
                    Some(_) => TelnetStatus::Subnegotiation,
                    None => break,
                },
            };
        }

        TelnetOutcome::next(status)
    }
}
