//! Integration tests for the crawler
//!
//! These tests use wiremock to serve small catalog fixtures and exercise
//! the fetcher and the full traversal end-to-end.

mod fetch_tests;
mod support;
mod traversal_tests;
