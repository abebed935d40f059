//! Integration test suite for overseer.
//!
//! These tests drive the full orchestration loop with scripted Worker and
//! Reviewer capabilities, so they exercise the coordinator, scheduler,
//! circuit breaker, and store together without spawning any external
//! processes.
//!
//! # Test Categories
//!
//! - `lifecycle`: full runs through the work/review cycle and halt paths
//! - `scheduling`: dependency ordering across multi-task catalogs
//! - `recovery`: persistence, resume, and checkpoint behavior

mod fixtures;

mod lifecycle;
mod scheduling;
