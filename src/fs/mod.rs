//! Local filesystem concerns: identity hashing, traversal and exclusions.

pub mod exclude;
pub mod hasher;
pub mod walker;
