//! # emofuse common library
//!
//! Shared code for the emofuse engine and its adapters:
//! - Emotion categories and score vectors
//! - Fusion result model
//! - Event types and EventBus
//! - Hot-swappable fusion parameters
//! - Bootstrap configuration loading
//! - Error type and time utilities

pub mod config;
pub mod emotion;
pub mod error;
pub mod events;
pub mod fusion;
pub mod params;
pub mod time;

pub use emotion::{Category, ScoreVector};
pub use error::{Error, Result};
pub use fusion::{Channel, FusionPlan, FusionResult, Strategy, TemporalAdjustment, Weights};
