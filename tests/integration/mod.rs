//! Integration test modules.

mod engine_test;
mod nearby_integration_test;
