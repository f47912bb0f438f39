//! Tests for variant values

mod foreign;
