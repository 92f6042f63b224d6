//! Data models of this crate.

pub mod broker;
pub mod catalog;
