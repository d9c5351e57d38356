//! Tests for the iteration engine and the shared accumulators.
