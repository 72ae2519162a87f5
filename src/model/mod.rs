//! Record types exported by the harvester
//!
//! # Components
//!
//! - `Position`: totally ordered message timestamp used for checkpoints and sorting
//! - `Parent`: a thread-starting message
//! - `Reply`: a message nested under exactly one parent
//! - `ParentRow`: flattened tabular projection of a parent

mod message;
mod position;

pub use message::{Parent, ParentRow, Reply};
pub use position::Position;
