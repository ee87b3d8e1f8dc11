//! Bootstrap core of a chat-bot shell.
//!
//! The shell discovers engines from an external and a bundled directory,
//! applies each to one shared [`context::Context`], waits for login and
//! config, then bridges its [`bus::EventBus`] to the server subsystem.

pub mod app;
pub mod bus;
pub mod context;
pub mod element;
pub mod engine;
pub mod logging;
pub mod readiness;
pub mod server;
pub mod services;
pub mod settings;
pub mod style;
pub mod util;
