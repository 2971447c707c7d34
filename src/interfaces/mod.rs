//! Driving adapters: request/response models for the transport layer and the
//! CSV formats used by the command line.

pub mod api;
pub mod csv;
