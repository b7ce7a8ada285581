//! Cross-aggregate workflows for the medicine order backend.
//!
//! The domain crate keeps carts, orders and stock apart; this crate ties
//! them together:
//! 1. Checkout: cart snapshot → order → stock → cart clear → notification
//! 2. Order desk: lifecycle commands plus restocking on cancel and return
//! 3. Notifications: status changes fanned out per order and per user
//!
//! If saving a new order fails after stock was taken, the stock is put back.

pub mod checkout;
pub mod desk;
pub mod error;
pub mod notifications;

pub use checkout::{CheckoutCoordinator, CheckoutOutcome};
pub use desk::{DeskOutcome, OrderDesk};
pub use error::{FulfillmentError, Result};
pub use notifications::{BroadcastPublisher, NoopPublisher, StatusChange, StatusPublisher};
