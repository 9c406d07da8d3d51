//! Protectogram - Panic Incident Orchestrator
//!
//! When a traveler raises a panic signal, this crate opens an incident,
//! fans out alerts to their guardians over chat and voice, and drives a
//! durable retry cascade until a guardian acknowledges or the traveler
//! cancels.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
