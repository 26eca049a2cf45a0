//! Error types for the helmet simulator
use std::time::Duration;
use thiserror::Error;

use crate::models::SessionState;

/// Failures on the publish/subscribe boundary
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid broker URL '{0}'")]
    InvalidBrokerUrl(String),

    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("no delivery acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("transport connection closed")]
    Closed,
}

/// Failures talking to the onboarding-status service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("service URL cannot carry a path: {0}")]
    NotABase(String),

    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed status response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Invalid environment configuration
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: String, value: String },
}

/// Top-level error returned by a simulation run
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("status service error: {0}")]
    Service(#[from] ServiceError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
