//! Identifier types shared by every crate of the order backend.

mod types;

pub use types::{MedicineId, OrderId, UserId};
