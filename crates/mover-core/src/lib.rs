//! mover-core — Core library for the mover version control client.
//!
//! Mover is an experimental client demonstrating **move tracking**: files
//! and directories are *elements* with stable integer ids, so a move or
//! rename is recorded as the same element in a new place, and branching
//! carries element identity instead of path identity.

pub mod actions;
pub mod branch;
pub mod diff;
pub mod element;
pub mod error;
pub mod fsutil;
pub mod lock;
pub mod merge;
pub mod migrate;
pub mod relpath;
pub mod remote;
pub mod replay;
pub mod repos;
pub mod store;
pub mod ui;
pub mod wc;

pub use error::{MoverError, MoverResult};
pub use wc::WorkingCopy;
