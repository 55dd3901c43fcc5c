//! Application layer: the workflows behind each user-visible flow and the
//! router that feeds them.
//!
//! Workflows hold their collaborators as `Arc<dyn Trait>` ports and convert
//! every failure into a user-facing notice at the call site where it
//! happens; nothing here aborts a sibling flow.

pub mod access;
pub mod admin;
pub mod funds;
pub mod router;
pub mod support;
