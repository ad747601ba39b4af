pub mod advisory;
pub mod analytics;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod schedule;
pub mod state;
