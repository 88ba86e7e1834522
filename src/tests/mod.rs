//! Whole-program scenarios run through the public entry point
//! ([`crate::preprocess::PreprocessSolver`]) rather than against any one
//! module in isolation.

mod end_to_end;
