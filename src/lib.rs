pub mod access;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateways;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod service;
pub mod state;
pub mod tracker;
