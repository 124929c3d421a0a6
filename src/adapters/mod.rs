//! Infrastructure adapters. Implement outbound ports.
//!
//! Telegram, filesystem, in-memory mock. Map errors to DomainError.

pub mod mock;
pub mod persistence;
pub mod telegram;
pub mod ui;
