//! Common types shared across the whole crate

pub mod batch_item;
pub mod breadcrumb;
pub mod entry;
pub mod error;
pub mod event;
pub mod page;
pub mod session_state;
pub mod sorting;
