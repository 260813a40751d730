//! Live gold point-of-sale pricing core.
//!
//! Combines a streaming gold spot quote and a streaming scale weight with
//! configurable karat purity, manufacturing-fee schedules, and tax rules to
//! produce a continuously updating sell/buy price.
//!
//! Two independent feeds (price and weight) each run their own reconnect
//! state machine; an orchestrator sequences session acquisition, a market
//! status probe, and feed selection, and re-acquires the session whenever
//! the backend signals token expiry.

/// Application state and the session -> market status -> feed orchestration.
pub mod app;

/// Typed accessors over the persistent key-value configuration store.
pub mod config;

/// Device identity and subscription gating.
pub mod device;

/// Fault taxonomy shared across components.
pub mod error;

/// Streaming feed connections (price and weight) with fixed-delay reconnect.
pub mod feed;

/// One-shot market open/closed snapshot probe.
pub mod market;

/// Pure price computation: spot quote + purity + fee schedule + tax.
pub mod pricing;

/// Two-token session credential acquisition.
pub mod session;
