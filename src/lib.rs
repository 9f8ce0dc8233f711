//! # s3browse
//!
//! Core of a key/prefix file browser over S3 and S3-compatible stores:
//! paginated listing sessions, client-side folder simulation, concurrent
//! batch uploads and deletes, and the view state that ties them together.
//!
//! The library carries all the behavior; the s3browse binary is a thin
//! listing front end over it.

#![forbid(unsafe_code)]

pub mod model;
pub mod paths;
pub mod services;
pub mod settings;
pub mod utils;
