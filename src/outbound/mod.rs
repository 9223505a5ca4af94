//! Driven adapters: PostgreSQL persistence and the in-process event bus.

pub mod events;
pub mod persistence;
