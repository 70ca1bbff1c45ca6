//! CLI subcommands.

pub mod common;
pub mod convert;
pub mod info;
pub mod play;
pub mod record;
pub mod types;
