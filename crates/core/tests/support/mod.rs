//! Shared test helpers for `fieldclock-core` integration tests.
//!
//! An in-memory store implementing every port, plus fixtures for building
//! workers, sessions and movements on a fixed calendar day.

#![allow(dead_code)]

pub mod fixtures;
pub mod repositories;
