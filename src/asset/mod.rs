//! The asset request pipeline and its building blocks.
//!
//! Leaf modules are pure functions over strings and sizes; only
//! [`pipeline`] touches the object store.

pub mod cache_control;
pub mod conditional;
pub mod key;
pub mod pipeline;
pub mod range;
