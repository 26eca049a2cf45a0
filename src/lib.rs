//! Smart helmet device simulator
//!
//! Streams synthetic PPG frames and accelerometer samples for one helmet over
//! MQTT and reacts to drowsiness commands sent back by the monitoring side.

pub mod command;
pub mod config;
pub mod error;
pub mod models;
pub mod sensors;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;
