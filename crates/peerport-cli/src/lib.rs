//! WebSocket front end for the peerport adapter
//!
//! Every client socket gets its own adapter and handle registry. All of them
//! share one loopback network, so clients can open channels and calls to
//! each other by peer id.

pub mod server;
pub mod session;

pub use server::{AppState, PeerportServer};
pub use session::{inbound_frames, run_session, Frame};
