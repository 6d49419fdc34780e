pub mod auth;
pub mod background;
pub mod client;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod webhook;
