//! Read projections built from the store's listings.
//!
//! Projections are pure functions of the records they are given; they keep
//! no state of their own and are recomputed on every request.

pub mod dashboard;

pub use dashboard::DashboardSummary;
