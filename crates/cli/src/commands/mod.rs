//! CLI subcommand implementations

pub mod assemble;
pub mod inspect;
pub mod process;
