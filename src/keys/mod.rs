//! SSH public key handling
//!
//! Reading `authorized_keys`-style files, collapsing duplicate lines and turning
//! each remaining line into an [`SshKey`].

mod lines;
mod parse;

pub use lines::{decode_lines, dedup_unordered, read_lines};
pub use parse::{SshKey, parse_keys};
