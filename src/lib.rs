//! # admitq
//!
//! Priority work-admission queue for inference requests.
//!
//! Producers enqueue work with an urgency from 0 (most urgent) to 99. A pool
//! of workers claims the most urgent item, dispatches it to a model-serving
//! cluster and reports the outcome. Failed items come back at lower urgency,
//! stale claims are reaped, and operators can shed load from a dashboard.

pub mod admission;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod sync;
pub mod telemetry;
