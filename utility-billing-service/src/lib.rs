//! Utility Billing Service - payment reconciliation and service tickets for a
//! water district, on top of a remote row store.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
