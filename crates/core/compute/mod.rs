//! Pure coordinate computations: cell hashing and range validation.

pub mod hasher;
pub mod validation;

pub use hasher::{CELL_RESOLUTION, cell_of, is_valid_cell_id};
