//! Cross-cutting helpers: configuration, credentials, clock.

pub mod clock;
pub mod config;
pub mod credentials;
