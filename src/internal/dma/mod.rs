//! Descriptor rings and buffer ownership
//!
//! The pieces the transfer engine composes:
//! - [`descriptor`]: CONFIG word codec and external descriptor records
//! - [`ring::DescriptorRing`]: Programs, verifies, re-arms and tears down a chain
//! - [`pool::BufferPool`]: Fixed-size buffers and their ownership states
//!
//! # Note
//!
//! This is an internal module. Some accessors exist only for tests and
//! debugging.

// Allow dead code in this internal module - some accessors are test-only
#![allow(dead_code)]

pub mod descriptor;
pub mod pool;
pub mod ring;
