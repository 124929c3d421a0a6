//! Terminal output for the CLI.

pub mod render;

pub use render::{render_border, render_messages, render_validation};
