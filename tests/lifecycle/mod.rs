//! Tests for the peak lifecycle operations of the fit context.

mod properties;
mod rejected;
mod status;
mod storage;
