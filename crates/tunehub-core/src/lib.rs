pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod platform;
pub mod protocol;
