//! Input readers and the native container format.

pub mod container;
pub mod csv;
pub mod text;
