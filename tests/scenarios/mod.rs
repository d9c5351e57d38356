//! End-to-end fitting scenarios on simulated images.

mod lost_peak;
mod original_algorithm;
mod single_peak;
