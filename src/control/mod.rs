//! The out-of-band HTTP control surface.

pub mod server;

pub use server::{router, ControlServer, ControlState};
