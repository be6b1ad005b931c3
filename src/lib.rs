//! memocue library
//!
//! Core engine for an ordered collection of time-bound reminders:
//! fractional-key reordering, local/remote reconciliation with a sticky
//! permission-denied fallback, dual-path notification scheduling, and a
//! single-slot delete/undo buffer.

pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod ordering;
pub mod ports;
pub mod quickadd;
pub mod services;
pub mod storage;
