//! Scheme backends implementing the capability traits of [`crate::he`].
pub mod slots;
