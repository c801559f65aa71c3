pub mod agent;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod google;
pub mod server;
