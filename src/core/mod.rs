//! Runtime of the bridge: the connection supervisor, the outbound relay and
//! the pieces they share.

pub mod backoff;
pub mod relay;
pub mod signals;
pub mod state;
pub mod supervisor;

pub use backoff::Backoff;
pub use relay::{OutboundRelay, PendingPublish, PublishOutcome, PublishResult, StatsSnapshot};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
