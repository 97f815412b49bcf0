//! Integration test entry point.
//!
//! Individual test modules live in tests/integration/.
//!
//! Run all integration tests:
//!   cargo test --test integration
//!
//! Run one module:
//!   cargo test --test integration scenario

#[path = "integration/scenario_tests.rs"]
mod scenario_tests;

#[path = "integration/property_tests.rs"]
mod property_tests;
