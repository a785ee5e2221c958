// ABOUTME: Configuration and constants for the compiler CLI

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "blangc";
pub const ABOUT: &str = "Ahead-of-time compiler for a small C-like language, emitting textual SSA IR";
