//! Filesystem primitives shared by the store and the leadership marker.

mod atomic;

pub use atomic::{atomic_write, atomic_write_file};
