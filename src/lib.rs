//! Cobuy - Order Cycle Lifecycle Engine
//!
//! This crate coordinates group purchases through time-boxed order
//! cycles: members place orders while a collecting window is open,
//! qualifying orders move through a payment window, and a background
//! worker closes lapsed windows, suspending members who defaulted.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
