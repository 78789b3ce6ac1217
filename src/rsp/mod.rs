//! Minimal GDB Remote Serial Protocol stub.
//!
//! One worker thread owns the listening socket and at most one client. Each
//! packet is answered by calling into a [`Target`] before the next socket event
//! is looked at.

pub mod packet;
pub mod server;
pub mod target;

pub use server::{Command, RspServer};
pub use target::Target;
