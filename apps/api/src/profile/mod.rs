// User profiles: the nested document, its validation and partial-merge rules,
// and the lifecycle of its avatar, banner and certificate files.

pub mod assets;
pub mod completeness;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod service;
pub mod validation;
