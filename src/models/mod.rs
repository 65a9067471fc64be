pub mod booking;
pub mod cancellation;
pub mod driver;
pub mod event;
pub mod fare;
pub mod money;
pub mod payment;
