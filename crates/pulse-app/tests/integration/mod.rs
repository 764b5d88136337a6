//! Integration tests for pulse-app.
//!
//! These tests verify the interaction between components:
//! - Application start-up against a live feed
//! - Subscription flow from adapters to the wire
//! - Shutdown leaving no connection behind

pub mod common;
