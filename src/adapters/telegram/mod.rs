//! Telegram adapter: grammers client, session, tl -> domain mapping.

pub mod client;
pub mod mapper;
pub mod session;

pub use client::GrammersGateway;
