//! `consorcia-events`: in-process publish/subscribe primitives.
//!
//! Delivery is synchronous and in registration order, on the publishing call.

pub mod bus;
pub mod observers;

pub use bus::Subscription;
pub use observers::{ObserverId, Observers};
