//! Utility functions shared by the commands

pub mod io;

pub use io::atomic_write;
