pub mod calendar;
pub mod config;
mod config_env;
pub mod llm;
pub mod models;
pub mod repos;
pub mod timezone;
