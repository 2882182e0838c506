//! Core types and logic for autoprompt.
//!
//! This crate holds the parts of the prompt-answering engine that do not
//! touch a terminal or a clock: ANSI stripping, pattern compilation and
//! matching, deduplication, and the response types that describe which
//! keystrokes to send.
//!
//! # Modules
//!
//! - [`ansi`]: ANSI/control sequence stripping and line splitting
//! - [`pattern`]: Pattern specs, fragment templates and the sequence matcher
//! - [`response`]: Literal, sequence and computed keystroke responses
//! - [`dedup`]: Dedup keys that keep unchanged prompts from firing twice
//! - [`error`]: Registration and matching errors with suggestions
//!
//! # Example
//!
//! ```
//! use autoprompt_core::pattern::{PatternKind, PatternMatcher, PatternSpec};
//! use autoprompt_core::response::Response;
//!
//! let mut matcher = PatternMatcher::new();
//! matcher
//!     .add_pattern(
//!         PatternSpec::new("create-file", ["Do you want to create {{ fileName }}?", "❯ 1. Yes"])
//!             .with_kind(PatternKind::Prompt)
//!             .with_response(Response::Literal("1".into())),
//!     )
//!     .unwrap();
//!
//! let results = matcher
//!     .process_data("Do you want to create notes.md?\n❯ 1. Yes\n  2. No")
//!     .unwrap();
//! assert_eq!(results[0].extracted_data["fileName"], "notes.md");
//! ```

pub mod ansi;
pub mod dedup;
pub mod error;
pub mod pattern;
pub mod response;
