//! tg-cache: Telegram channel snapshot cache with boundary validation, Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
