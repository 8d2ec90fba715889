//! Authoritative synchronization hub: one actor, one sequencer, N peers.
//! Data flow: peer command -> hub -> board service -> store, then the
//! accepted command is stamped with the next sequence and fanned out.

mod auth;
mod hub;
mod peer;
mod sequencer;
mod server;

pub use auth::{AuthError, GithubVerifier, StaticVerifier, TokenVerifier};
pub use hub::{Hub, HubEvent, HubHandle, PeerHandle, PeerId, OUTBOUND_BUFFER};
pub use peer::{RateLimiter, BURST_WINDOW, RATE_LIMIT_BURST, RATE_LIMIT_PER_MIN};
pub use sequencer::Sequencer;
pub use server::{origin_allowed, Server, ServerConfig, ServerError};
