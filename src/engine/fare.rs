use crate::models::booking::Waypoint;
use crate::models::driver::VehicleClass;
use crate::models::fare::{FareLine, FareQuote};
use crate::models::money::{Distance, Money};

/// Longest trip, detours included, the service will quote.
pub const MAX_QUOTABLE_DISTANCE: Distance = Distance::from_km(5_000);

/// Surcharge for every stop, on-route or not.
pub fn waypoint_flat_fee(class: VehicleClass) -> Money {
    match class {
        VehicleClass::Bike => Money::new(5_000),
        VehicleClass::Bajaj => Money::new(6_000),
        VehicleClass::Car => Money::new(8_000),
        VehicleClass::Van => Money::new(10_000),
        VehicleClass::Truck => Money::new(15_000),
    }
}

/// Quotes a distance-based trip. Pure: the same inputs always give the same quote.
pub fn compute_fare(
    base_distance: Distance,
    waypoints: &[Waypoint],
    class: VehicleClass,
    rate_per_km: Money,
) -> FareQuote {
    let total_distance = trip_distance(base_distance, waypoints);
    let base_fare = total_distance.priced_at(rate_per_km);

    let mut breakdown = vec![FareLine {
        label: format!("Distance ({} m)", total_distance.meters()),
        amount: base_fare,
    }];

    let flat_fee = waypoint_flat_fee(class);
    let mut waypoint_fees = Money::ZERO;
    for (index, waypoint) in waypoints.iter().enumerate() {
        let detour = waypoint.billable_detour();
        let fee = flat_fee + detour.priced_at(rate_per_km);
        waypoint_fees = waypoint_fees + fee;

        let label = if waypoint.is_on_route {
            format!("Stop {} (on route)", index + 1)
        } else {
            format!("Stop {} (detour {} m)", index + 1, detour.meters())
        };
        breakdown.push(FareLine { label, amount: fee });
    }

    FareQuote {
        rate_per_km,
        total_distance,
        base_fare,
        waypoint_fees,
        total_fare: base_fare + waypoint_fees,
        breakdown,
    }
}

/// Base distance plus every billable detour.
pub fn trip_distance(base_distance: Distance, waypoints: &[Waypoint]) -> Distance {
    base_distance + waypoints.iter().map(Waypoint::billable_detour).sum::<Distance>()
}

pub fn compute_hourly_fare(hours: u32, hourly_rate: Money) -> Money {
    hourly_rate.times(i64::from(hours))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::models::booking::GeoPoint;

    fn stop(is_on_route: bool, detour_km: u64) -> Waypoint {
        Waypoint {
            location: GeoPoint {
                lat: -6.79,
                lng: 39.21,
            },
            is_on_route,
            detour_distance: Distance::from_km(detour_km),
        }
    }

    fn waypoint_strategy() -> impl Strategy<Value = Waypoint> {
        (any::<bool>(), 0u64..20_000).prop_map(|(is_on_route, meters)| Waypoint {
            location: GeoPoint { lat: 0.0, lng: 0.0 },
            is_on_route,
            detour_distance: Distance::from_meters(meters),
        })
    }

    #[test]
    fn off_route_stop_scenario() {
        let quote = compute_fare(
            Distance::from_km(5),
            &[stop(false, 2)],
            VehicleClass::Bike,
            Money::new(2_500),
        );

        assert_eq!(quote.total_distance, Distance::from_km(7));
        assert_eq!(quote.base_fare, Money::new(17_500));
        assert_eq!(quote.waypoint_fees, Money::new(10_000));
        assert_eq!(quote.total_fare, Money::new(27_500));
        assert_eq!(quote.breakdown.len(), 2);
    }

    #[test]
    fn on_route_stop_ignores_its_detour() {
        let quote = compute_fare(
            Distance::from_km(5),
            &[stop(true, 4)],
            VehicleClass::Car,
            Money::new(4_000),
        );

        assert_eq!(quote.total_distance, Distance::from_km(5));
        assert_eq!(quote.waypoint_fees, Money::new(8_000));
        assert_eq!(quote.total_fare, Money::new(28_000));
    }

    #[test]
    fn no_waypoints_is_just_distance() {
        let quote = compute_fare(Distance::from_km(3), &[], VehicleClass::Bajaj, Money::new(3_000));
        assert_eq!(quote.waypoint_fees, Money::ZERO);
        assert_eq!(quote.total_fare, Money::new(9_000));
        assert_eq!(quote.breakdown.len(), 1);
    }

    #[test]
    fn oversized_distances_do_not_overflow() {
        let quote = compute_fare(
            Distance::from_meters(u64::MAX),
            &[Waypoint {
                detour_distance: Distance::from_meters(1),
                ..stop(false, 0)
            }],
            VehicleClass::Bike,
            Money::new(2_500),
        );

        assert_eq!(quote.total_distance, Distance::from_meters(u64::MAX));
        assert_eq!(quote.total_fare, Money::new(i64::MAX));
        assert!(quote.total_distance > MAX_QUOTABLE_DISTANCE);
    }

    #[test]
    fn hourly_fare_is_rate_times_hours() {
        assert_eq!(compute_hourly_fare(3, Money::new(30_000)), Money::new(90_000));
    }

    proptest! {
        #[test]
        fn prop_quote_is_reproducible(
            meters in 0u64..200_000,
            stops in proptest::collection::vec(waypoint_strategy(), 0..6),
            rate in 0i64..10_000,
        ) {
            let first = compute_fare(Distance::from_meters(meters), &stops, VehicleClass::Van, Money::new(rate));
            let second = compute_fare(Distance::from_meters(meters), &stops, VehicleClass::Van, Money::new(rate));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_on_route_stops_add_only_flat_fees(
            meters in 0u64..200_000,
            detours in proptest::collection::vec(0u64..20, 0..6),
            rate in 0i64..10_000,
        ) {
            let stops: Vec<Waypoint> = detours.iter().map(|km| stop(true, *km)).collect();
            let plain = compute_fare(Distance::from_meters(meters), &[], VehicleClass::Bike, Money::new(rate));
            let with_stops = compute_fare(Distance::from_meters(meters), &stops, VehicleClass::Bike, Money::new(rate));
            let flat_fees = waypoint_flat_fee(VehicleClass::Bike).times(stops.len() as i64);

            prop_assert_eq!(plain.total_fare, with_stops.total_fare - flat_fees);
            prop_assert_eq!(plain.total_distance, with_stops.total_distance);
        }
    }
}
