pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod reports;
pub mod telemetry;
pub mod users;
