//! Prompt-answering engine: PTY, screen mirror, trigger, queue and monitor.

pub mod activity;
pub mod policy;
pub mod pty;
pub mod queue;
pub mod rawmode;
pub mod records;
pub mod session;
pub mod terminal;
pub mod timer;
pub mod trigger;
