//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the retail site and the
//! generative backend, and tempfile for on-disk databases.

mod common;
mod export_tests;
mod harvest_tests;
mod http_tests;
mod storage_tests;
