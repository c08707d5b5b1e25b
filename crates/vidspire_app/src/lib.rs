//! `vidspire` terminal client: configuration, local state and the session
//! loops behind each subcommand.
pub mod app;
pub mod config;
pub mod effects;
pub mod persistence;
pub mod render;
