//! Domain types and service contracts

pub mod auth;
pub mod communication;
