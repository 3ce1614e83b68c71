//! # cinder-core
//! Data model, canonical serialization, and script analysis for the Cinder
//! protocol.

pub mod constants;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod script;
pub mod ser;
pub mod types;
