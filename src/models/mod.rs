//! Domain model module declarations.

pub mod event;
pub mod intention;
pub mod reminder;
