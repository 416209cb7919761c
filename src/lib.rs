//! Finance OS credential lifecycle and data extraction

pub mod api;
pub mod auth;
pub mod config;
