//! Schoolgate - login security pipeline for the school portal
//!
//! This library provides identity resolution, ledger-backed rate limiting,
//! credential verification, session token issuance, the security event
//! channel and attempt ledger retention, plus the HTTP surface over them.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
