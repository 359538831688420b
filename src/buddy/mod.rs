//! Binary buddy allocation over contiguous arenas

mod tree;

pub mod arena;

pub use arena::Arena;
