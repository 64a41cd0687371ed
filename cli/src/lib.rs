mod commands;
mod seed;

pub use commands::{Cli, Error};
