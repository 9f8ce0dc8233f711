//! Listing sessions, batch transfers and the view state they feed

pub mod batch;
pub mod listing;
pub mod object_store;
pub mod progress;
pub mod s3_store;
pub mod sts;
pub mod view_state;

#[cfg(test)]
pub(crate) mod test_support;
