//! fl-testkit
//!
//! In-memory backends and fixtures for exercising the lifecycle coordinator
//! without Postgres. The scenario tests under `tests/` run against these.

mod fakes;
mod harness;
mod store;

pub use fakes::{ManualClock, RecordingNotifier};
pub use harness::{insured_damage, start_time, uninsured_damage, Harness, START_TS};
pub use store::{MemoryStore, Tables};
