//! Core domain types shared across the application and infrastructure layers.

pub mod errors;
pub mod model;
