//! Read-only view of the rendered document.
//!
//! The readiness tracker never touches rendered content. It only enumerates
//! asset-bearing nodes, reads their completion evidence, attaches load
//! listeners and watches for inserted subtrees. This crate models exactly that
//! surface so the tracker can run against a real host or against
//! [`memory::MemoryDocument`].

pub mod document;
pub mod element;
pub mod memory;
pub mod node;

pub use document::*;
pub use element::*;
pub use node::*;
