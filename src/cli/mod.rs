pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod env;
pub mod output;
