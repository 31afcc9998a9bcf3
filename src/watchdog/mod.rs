//! Watchdog Module
//!
//! This module provides the driver supervision loop. The watcher probes the
//! NUT server on a fixed cadence and asks systemd to restart the driver unit
//! once the driver has stopped answering for too long.

pub mod health;
pub mod nut;
pub mod restart;
pub mod supervisor;


pub use health::{HealthChecker, NutHealthChecker};
pub use nut::{NutClient, NutError, Ups, DEFAULT_NUT_PORT};
pub use restart::{SystemctlRestarter, UnitRestarter};
pub use supervisor::{TickOutcome, Watcher, WatcherState};
