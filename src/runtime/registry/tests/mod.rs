//! Tests for the instance registry
