//! emofuse engine library
//!
//! Fuses per-room face and audio emotion classifications into one stabilized
//! decision and serves it over HTTP and Server-Sent Events.

pub mod api;
pub mod config;
pub mod fusion;
pub mod logging;
pub mod notify;

pub use fusion::{EngineSettings, FusionEngine};
pub use notify::{NotifierStats, ResultNotifier, Subscription};
