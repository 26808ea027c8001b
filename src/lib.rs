// src/lib.rs

pub mod app_state;
pub mod config;
pub mod error;
pub mod naming;
pub mod relational;
pub mod service;
pub mod vault;
