//! Channel layer for prompt-driven reads.
//!
//! This module handles the interactive side of a session: accumulating
//! output, stripping terminal escapes and waiting for prompts.

mod buffer;
pub mod patterns;
mod pty;

pub use buffer::PatternBuffer;
pub use pty::PtyChannel;
