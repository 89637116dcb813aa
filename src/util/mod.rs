//! Filesystem helpers shared by the store

pub mod path;
