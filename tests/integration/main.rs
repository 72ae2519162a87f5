//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the remote API and run full
//! harvests end-to-end against a temporary output directory.

mod common;
mod harvest_tests;
mod resume_tests;
