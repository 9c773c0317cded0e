//! Integration tests, run as a single test binary

mod crawl_tests;
mod page_tests;
