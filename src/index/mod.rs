//! In-process lexical indexing.

mod bm25;

pub use bm25::{Bm25Hit, Bm25Index};
