//! JSON configuration loaders for the demos.

pub mod track;
