pub mod cancellation;
pub mod dispatch;
pub mod fare;
pub mod membership;
pub mod rates;
pub mod sweep;
