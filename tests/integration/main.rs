//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the listing site and test
//! the full fetch, extract, image and storage cycle end-to-end.

mod common;
mod fetch_tests;
mod harvest_tests;
