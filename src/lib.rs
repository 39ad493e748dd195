pub mod auth;
pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod server;
pub mod store;
