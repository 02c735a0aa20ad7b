pub mod adb;
pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod fastboot;
pub mod logging;
pub mod mirror;
pub mod models;
pub mod session;
pub mod state;

#[cfg(test)]
pub mod testing;
