//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting the SQLite cache store.

pub mod list;

pub use list::list_impl;
