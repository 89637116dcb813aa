//! RESP protocol implementation
//!
//! This module provides RESP (REdis Serialization Protocol) parsing and the
//! document commands served on top of the store.

pub mod command;
pub mod document;
pub mod resp;

pub use command::CommandFactory;
pub use resp::{ParseError, Parser, Value};
