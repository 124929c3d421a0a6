//! In-memory gateway for tests and offline runs.

pub mod mock_gateway;

pub use mock_gateway::{message_at, MockGateway};
