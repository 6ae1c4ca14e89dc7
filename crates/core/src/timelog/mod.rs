//! Attendance reconciliation domain

pub mod backfill;
pub mod calendar;
pub mod disconnect;
pub mod inactivity;
pub mod ports;
pub mod punch;
pub mod reconciliation;
pub mod sequence;
