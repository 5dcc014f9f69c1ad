//! Database access for tunesmith-mg

pub mod tasks;
