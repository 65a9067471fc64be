use serde::{Deserialize, Serialize};

use crate::models::money::{Distance, Money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareLine {
    pub label: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareQuote {
    pub rate_per_km: Money,
    pub total_distance: Distance,
    pub base_fare: Money,
    pub waypoint_fees: Money,
    pub total_fare: Money,
    pub breakdown: Vec<FareLine>,
}
