//! Runtime system
//!
//! This module contains memory management, the static dataspace and array storage.

pub mod arrays;
pub mod dataspace;
pub mod memory;
