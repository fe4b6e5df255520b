//! Local spatial search in the rendezvous decomposition.

pub mod element_tree;

pub use element_tree::{ElementTree, INVALID_ELEMENT};
