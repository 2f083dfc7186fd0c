pub mod app;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod remote;
pub mod routes;
pub mod services;
pub mod stores;
pub mod utils;
