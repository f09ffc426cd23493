//! examforge-core: exam patterns, model fallback, response repair and the
//! exam progression state machine.
//!
//! This crate defines the data model, the collaborator traits (generation
//! backend, exam store, blob store) and every piece of exam logic. Concrete
//! backends and stores live in `examforge-providers` and `examforge-store`.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod parser;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod resolver;
pub mod traits;

#[cfg(test)]
mod test_support;
