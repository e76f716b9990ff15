//! Utility Modules

pub mod arena;

pub use arena::{ArenaVec, FreeListPool, Span};
