//! Domain service layer for a collaborative dial (shared gauge) service.
//!
//! Users contribute individual 0–100 values to shared dials; each dial rolls
//! its members' values up into a single aggregate, records every change into
//! a per-minute history series, and fans change events out to connected
//! members through an in-process event bus.
//!
//! The crate is split hexagonally: `domain` owns the entities, validation,
//! error kinds and the five driving ports; `outbound` provides the
//! PostgreSQL-backed service implementations and the event bus. Transports
//! (HTTP, CLI) are external clients of the ports.

pub mod domain;
pub mod outbound;
