//! Shared helpers for the HTTP routes
//!
//! These modules provide reusable patterns for:
//! - Pagination of list endpoints
//! - Request validation utilities

pub mod pagination;
pub mod validation;
