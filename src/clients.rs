//! Client session bookkeeping.
//!
//! Components:
//! - `client_session`: the session record, its tunnels and the handshake payload.
//! - `registry`: the concurrent in-memory session store.
//! - `filter`: listing criteria (tags, labels, connection state).
//! - `projection`: explicit field selection for API views.
//! - `snapshot`: crash-recovery persistence of the registry.
//! - `tasks`: periodic cleanup and snapshot tasks.

pub mod client_session;
pub mod filter;
pub mod projection;
pub mod registry;
pub mod snapshot;
pub mod tasks;

pub use client_session::{ClientSession, ConnectionRequest, Remote, Tunnel, TunnelProtocol};
pub use filter::{ClientFilter, ConnectionState, LabelMatcher, TagsOperator};
pub use registry::ClientSessionRegistry;
