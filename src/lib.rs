// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod catalog;
mod config;
mod coordination;
mod error;
mod formats;
mod table;
mod telemetry;
mod transform;

#[cfg(test)]
mod integ_tests;
