//! Application layer orchestrating domain logic and infrastructure.

pub mod agent;
pub mod capture;
pub mod editor;
pub mod export;
pub mod extract;
pub mod highlight;
pub mod session;
pub mod workbench;
