pub mod config;
pub mod pin;
pub mod vision;
