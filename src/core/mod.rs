// src/core/mod.rs

//! The central module containing the session and realtime cores.

pub mod auth;
pub mod console;
pub mod errors;
pub mod realtime;
pub mod session;

pub use console::ConsoleState;
pub use errors::VigilError;
