#![warn(unreachable_pub)]

pub mod atom;
pub mod config;
pub mod depset;
pub mod eapi;
mod error;
mod macros;
pub mod peg;
pub mod pkg;
pub mod required_use;
pub mod resolver;
pub mod restrict;
pub mod set;

pub use self::error::{Error, Result};

#[cfg(test)]
mod test;
