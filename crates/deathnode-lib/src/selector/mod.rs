//! Victim selection strategies
//!
//! A selector composes a constraint (candidate filter) with a recommender
//! (single choice). Both families are picked by configuration string and an
//! unknown name is rejected at construction time.

mod constraints;
mod recommenders;

pub use constraints::{new_constraint, Constraint};
pub use recommenders::{new_recommender, Recommender};
