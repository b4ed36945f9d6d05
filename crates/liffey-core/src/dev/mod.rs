//! Development server: watch, rebuild, mock, push.

pub mod mock;
pub mod server;
pub mod watch;

pub use server::{run, UpdatePayload, REBUILD_ROUTE, UPDATE_ROUTE};
