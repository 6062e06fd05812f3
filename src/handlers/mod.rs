//! Control-surface handlers

pub mod analyze;
pub mod control;
pub mod events;
pub mod health;
pub mod requests;
