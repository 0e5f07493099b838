//! # Persistence Router
//!
//! Dual-sink persistence: every reading goes to the primary store while it
//! is reachable and to the fallback buffer while it is not.
//!
//! ```text
//!  ingest queue ──▶ worker ──▶ PersistenceRouter ──▶ PrimaryStore
//!                                  │      │
//!                                  │      └────────▶ FallbackBuffer
//!                                  │ offline edge
//!                                  ▼
//!                      ReconnectionSupervisor ──probe──▶ PrimaryStore
//!                                  │
//!                                  └──▶ ConnectionTracker (Online)
//! ```
//!
//! ## State
//!
//! [`ConnectionTracker`] is the only shared state: online flag, active
//! session, failure time and the supervisor slot, all under one lock.
//!
//! ## Outage lifecycle
//!
//! 1. A failed or timed-out insert buffers the reading as `Fallback mode ON`
//!    and marks the tracker offline.
//! 2. The transition that claims the supervisor slot spawns exactly one
//!    [`ReconnectionSupervisor`]; later readings are buffered as
//!    `Fallback mode`.
//! 3. The supervisor probes every `poll_interval`. After a successful probe
//!    it creates the session if there is none, holds for `grace_period`,
//!    then flips the tracker online.
//!
//! The supervisor is tied to the router's lifetime through
//! [`PersistenceRouter::shutdown_supervisor`].

mod config;
mod router;
mod state;
mod supervisor;
mod worker;

pub use config::PersistenceConfig;
pub use router::{PersistenceRouter, RouteOutcome, RouterStats};
pub use state::{ConnectionSnapshot, ConnectionState, ConnectionTracker, OfflineTransition};
pub use supervisor::{ReconnectionSupervisor, SupervisorExit};
pub use worker::spawn_worker;
