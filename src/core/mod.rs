//! Core module containing the idle-time dispatch pipeline
//!
//! This module provides:
//! - Session state shared by every stage of a cycle
//! - Capture rings, their cycle-scoped locks, and capture dispatch
//! - Transport layer (Serial, TCP) and the communication pump
//! - Protocol mode dispatch (Telnet, transfer dialog, VT/TEK engines)
//! - Outbound transfers (clipboard text, files)
//! - The idle scheduler that ties them together

pub mod capture;
pub mod logger;
pub mod mode;
pub mod scheduler;
pub mod session;
pub mod telnet;
pub mod terminal;
pub mod transfer;
pub mod transport;
