// src/state/mod.rs
//
// Control-side value types.
//
// These structures describe what the listener asked for. The control side
// edits its own copies and sends whole values to the audio thread as
// `Command`s; the engine never reads them in place.
//
// Key principles:
// - Steering is a small `Copy` value, replaced wholesale
// - Loaded data crosses the thread boundary as immutable `Arc`s
// - Replaced objects travel back as `CommandResult`s and are dropped
//   off the audio thread

mod command;
mod readback;
mod steering;

pub use command::*;
pub use readback::*;
pub use steering::*;
