// service-alerter library crate
// Exposes modules for integration testing

pub mod alerts;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod output;
pub mod platform;
pub mod scan;
pub mod server;
