//! Library crate for raclette-back, exposing modules for the kiosk binary and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod identity;
pub mod routes;
pub mod services;
pub mod state;
