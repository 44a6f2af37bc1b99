//! Lockgate Core - Login controller with brute-force lockout
//!
//! This crate provides:
//! - The login state machine (field edits, attempts, lockout countdown)
//! - Persisted failure bookkeeping and "remember me" token storage
//! - Connectivity publishing with last-value replay
//! - The authenticator seam and a demo implementation
//!
//! The controller is a single-device guard against repeated UI login
//! retries. It is not a security boundary.

pub mod auth;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod error;
pub mod lockout;
pub mod schedule;
pub mod state;
pub mod store;

pub use auth::{AuthFailure, Authenticator, DemoAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityPublisher, TcpProbe};
pub use controller::{AttemptOutcome, ControllerSettings, LoginController};
pub use error::{LockgateError, Result};
pub use lockout::LockoutPolicy;
pub use schedule::{RepeatingTask, Tick};
pub use state::{LoginPhase, LoginState, StateSnapshot};
pub use store::{CredentialStore, FailureRecord, FileStore, MemoryStore};
