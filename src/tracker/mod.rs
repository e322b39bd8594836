use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo;
use crate::models::courier::{Courier, CourierPosition, GeoPoint};
use crate::models::location::{Activity, LocationSample, PositionReport};
use crate::state::AppState;

/// Ingests one position report from a courier device.
///
/// The sample is always recorded for route reconstruction. The live
/// position only moves when the courier actually moved past the
/// configured threshold; idle devices reporting every minute would
/// otherwise rewrite the live row with noise.
pub fn report_position(
    state: &AppState,
    courier_id: Uuid,
    lat: f64,
    lng: f64,
    accuracy_m: Option<f64>,
) -> Result<PositionReport, DispatchError> {
    if let Err(err) = geo::validate_coords(lat, lng) {
        state
            .metrics
            .position_reports_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(err);
    }
    if let Some(acc) = accuracy_m {
        if !acc.is_finite() || acc < 0.0 {
            state
                .metrics
                .position_reports_total
                .with_label_values(&["rejected"])
                .inc();
            return Err(DispatchError::Validation(format!(
                "accuracy {acc} must be non-negative"
            )));
        }
    }

    let now = Utc::now();
    let new_point = GeoPoint { lat, lng };

    let report = {
        let mut courier = state
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| DispatchError::NotFound(format!("courier {courier_id}")))?;

        let distance_moved_m = courier
            .position
            .as_ref()
            .map(|prev| geo::distance_meters(prev, &new_point));

        let moved = match distance_moved_m {
            Some(distance) => distance >= state.config.movement_threshold_m,
            None => true,
        };

        if moved {
            courier.position = Some(new_point);
            courier.accuracy_m = accuracy_m;
            courier.last_position_at = Some(now);
            courier.online = true;
            courier.updated_at = now;
        }

        let outcome = if moved { "moved" } else { "deduplicated" };
        state
            .metrics
            .position_reports_total
            .with_label_values(&[outcome])
            .inc();

        PositionReport {
            accepted: moved,
            distance_moved_m,
        }
    };

    append_sample(
        state,
        LocationSample {
            courier_id,
            lat,
            lng,
            accuracy_m,
            speed_mps: None,
            heading_deg: None,
            recorded_at: now,
        },
    );

    Ok(report)
}

fn append_sample(state: &AppState, sample: LocationSample) {
    let retention = Duration::seconds(state.config.sample_retention_secs);
    let cutoff = sample.recorded_at - retention;

    let mut history = state.samples.entry(sample.courier_id).or_default();
    history.retain(|old| old.recorded_at >= cutoff);
    history.push(sample);
}

/// Online couriers with a live position, freshest first. Staleness is
/// healed lazily on the way through, so a courier whose device went
/// silent drops out of this list without a background sweep.
pub fn list_active_positions(state: &AppState, branch_id: Option<Uuid>) -> Vec<CourierPosition> {
    let now = Utc::now();
    let mut rows: Vec<CourierPosition> = state
        .couriers
        .iter_mut()
        .filter_map(|mut entry| {
            let courier = entry.value_mut();
            heal_staleness(courier, state.config.staleness_window_secs(), now);

            if !courier.online {
                return None;
            }
            if let Some(branch) = branch_id {
                if courier.branch_id != branch {
                    return None;
                }
            }
            let position = courier.position?;
            Some(CourierPosition {
                courier_id: courier.id,
                name: courier.name.clone(),
                branch_id: courier.branch_id,
                position,
                accuracy_m: courier.accuracy_m,
                last_position_at: courier.last_position_at?,
            })
        })
        .collect();

    rows.sort_by(|a, b| b.last_position_at.cmp(&a.last_position_at));
    rows
}

/// Derives a courier's online state from report recency and corrects
/// the stored flag when they disagree.
pub fn evaluate_activity(state: &AppState, courier_id: Uuid) -> Result<Activity, DispatchError> {
    let now = Utc::now();
    let mut courier = state
        .couriers
        .get_mut(&courier_id)
        .ok_or_else(|| DispatchError::NotFound(format!("courier {courier_id}")))?;

    heal_staleness(&mut courier, state.config.staleness_window_secs(), now);

    Ok(Activity {
        online: courier.online,
        seconds_since_update: courier
            .last_position_at
            .map(|at| (now - at).num_seconds()),
    })
}

/// A courier is online while reports keep arriving inside the staleness
/// window. On the online->offline flip the live position is cleared so
/// a stale position is never served as current.
pub(crate) fn heal_staleness(courier: &mut Courier, window_secs: i64, now: DateTime<Utc>) {
    let derived_online = match courier.last_position_at {
        Some(at) => (now - at).num_seconds() < window_secs,
        None => false,
    };

    if courier.online && !derived_online {
        debug!(courier_id = %courier.id, "courier went stale; marking offline");
        courier.online = false;
        courier.position = None;
        courier.accuracy_m = None;
        courier.updated_at = now;
    } else if !courier.online && derived_online {
        courier.online = true;
        courier.updated_at = now;
    }
}

/// Active couriers within `radius_m` of `origin` that pass `eligible`,
/// nearest first. Equal distances order by courier id so repeated scans
/// over the same snapshot agree.
pub fn nearest_couriers<F>(
    state: &AppState,
    origin: &GeoPoint,
    radius_m: f64,
    limit: usize,
    eligible: F,
) -> Vec<(Courier, f64)>
where
    F: Fn(&Courier) -> bool,
{
    let now = Utc::now();
    let mut candidates: Vec<(Courier, f64)> = state
        .couriers
        .iter_mut()
        .filter_map(|mut entry| {
            let courier = entry.value_mut();
            heal_staleness(courier, state.config.staleness_window_secs(), now);

            let position = courier.position?;
            if !courier.online || !eligible(courier) {
                return None;
            }
            let distance = geo::distance_meters(origin, &position);
            if distance > radius_m {
                return None;
            }
            Some((courier.clone(), distance))
        })
        .collect();

    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{evaluate_activity, list_active_positions, nearest_couriers, report_position};
    use crate::config::Config;
    use crate::geo::distance_meters;
    use crate::models::courier::{Courier, GeoPoint, VehicleType};
    use crate::state::AppState;

    fn test_state() -> AppState {
        let (state, _effect_rx) = AppState::new(Config::default());
        state
    }

    fn courier(id_seed: u128, branch_id: Uuid) -> Courier {
        Courier {
            id: Uuid::from_u128(id_seed),
            name: format!("courier-{id_seed}"),
            phone: "+70000000000".to_string(),
            branch_id,
            vehicle: VehicleType::Car,
            online: false,
            position: None,
            accuracy_m: None,
            last_position_at: None,
            daily_capacity: 5,
            current_load: 0,
            rating: 4.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_report_sets_live_position_and_online() {
        let state = test_state();
        let branch = Uuid::new_v4();
        let c = courier(1, branch);
        state.couriers.insert(c.id, c.clone());

        let report = report_position(&state, c.id, 55.75, 37.61, Some(10.0)).unwrap();
        assert!(report.accepted);
        assert!(report.distance_moved_m.is_none());

        let stored = state.couriers.get(&c.id).unwrap();
        assert!(stored.online);
        assert!(stored.position.is_some());
        assert_eq!(state.samples.get(&c.id).unwrap().len(), 1);
    }

    #[test]
    fn report_below_threshold_keeps_live_position_but_records_sample() {
        let state = test_state();
        let c = courier(1, Uuid::new_v4());
        state.couriers.insert(c.id, c.clone());

        report_position(&state, c.id, 55.75, 37.61, None).unwrap();
        let first_at = state.couriers.get(&c.id).unwrap().last_position_at;

        // ~50 m north, under the 100 m default threshold
        let report = report_position(&state, c.id, 55.75045, 37.61, None).unwrap();
        assert!(!report.accepted);
        let moved = report.distance_moved_m.unwrap();
        assert!((40.0..60.0).contains(&moved), "got {moved}");

        let stored = state.couriers.get(&c.id).unwrap();
        assert_eq!(stored.position.unwrap().lat, 55.75);
        assert_eq!(stored.last_position_at, first_at);
        assert_eq!(state.samples.get(&c.id).unwrap().len(), 2);
    }

    #[test]
    fn report_at_exact_threshold_moves_live_position() {
        let start = GeoPoint {
            lat: 55.75,
            lng: 37.61,
        };
        let next = GeoPoint {
            lat: 55.7506,
            lng: 37.61,
        };
        // pin the threshold to the exact reported distance; >= accepts
        let exact = distance_meters(&start, &next);
        let (state, _effect_rx) = AppState::new(Config {
            movement_threshold_m: exact,
            ..Config::default()
        });

        let c = courier(1, Uuid::new_v4());
        state.couriers.insert(c.id, c.clone());

        report_position(&state, c.id, start.lat, start.lng, None).unwrap();
        let report = report_position(&state, c.id, next.lat, next.lng, None).unwrap();

        assert!(report.accepted);
        assert_eq!(report.distance_moved_m.unwrap(), exact);
        assert_eq!(state.couriers.get(&c.id).unwrap().position.unwrap().lat, next.lat);
    }

    #[test]
    fn report_past_threshold_moves_live_position() {
        let state = test_state();
        let c = courier(1, Uuid::new_v4());
        state.couriers.insert(c.id, c.clone());

        report_position(&state, c.id, 55.75, 37.61, None).unwrap();
        // ~1.1 km north
        let report = report_position(&state, c.id, 55.76, 37.61, None).unwrap();
        assert!(report.accepted);
        assert!(report.distance_moved_m.unwrap() > 1_000.0);

        let stored = state.couriers.get(&c.id).unwrap();
        assert_eq!(stored.position.unwrap().lat, 55.76);
    }

    #[test]
    fn invalid_coordinates_rejected() {
        let state = test_state();
        let c = courier(1, Uuid::new_v4());
        state.couriers.insert(c.id, c.clone());

        assert!(report_position(&state, c.id, 91.0, 37.61, None).is_err());
        assert!(report_position(&state, c.id, 55.75, 181.0, None).is_err());
        assert!(report_position(&state, c.id, 55.75, 37.61, Some(-1.0)).is_err());
    }

    #[test]
    fn unknown_courier_is_not_found() {
        let state = test_state();
        let err = report_position(&state, Uuid::new_v4(), 55.75, 37.61, None).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn stale_courier_healed_offline_and_position_cleared() {
        let state = test_state();
        let c = courier(1, Uuid::new_v4());
        state.couriers.insert(c.id, c.clone());

        report_position(&state, c.id, 55.75, 37.61, None).unwrap();

        // backdate the last report past the staleness window
        {
            let mut stored = state.couriers.get_mut(&c.id).unwrap();
            stored.last_position_at = Some(Utc::now() - Duration::seconds(181));
        }

        let activity = evaluate_activity(&state, c.id).unwrap();
        assert!(!activity.online);
        assert!(activity.seconds_since_update.unwrap() >= 181);

        let stored = state.couriers.get(&c.id).unwrap();
        assert!(!stored.online);
        assert!(stored.position.is_none());
    }

    #[test]
    fn active_positions_filters_by_branch_and_sorts_by_recency() {
        let state = test_state();
        let branch_a = Uuid::new_v4();
        let branch_b = Uuid::new_v4();

        let c1 = courier(1, branch_a);
        let c2 = courier(2, branch_a);
        let c3 = courier(3, branch_b);
        for c in [&c1, &c2, &c3] {
            state.couriers.insert(c.id, c.clone());
        }

        report_position(&state, c1.id, 55.75, 37.61, None).unwrap();
        report_position(&state, c2.id, 55.76, 37.62, None).unwrap();
        report_position(&state, c3.id, 55.77, 37.63, None).unwrap();

        let all = list_active_positions(&state, None);
        assert_eq!(all.len(), 3);

        let branch_only = list_active_positions(&state, Some(branch_a));
        assert_eq!(branch_only.len(), 2);
        assert!(branch_only[0].last_position_at >= branch_only[1].last_position_at);
    }

    #[test]
    fn nearest_couriers_sorts_by_distance_with_id_tiebreak() {
        let state = test_state();
        let branch = Uuid::new_v4();
        let origin = GeoPoint {
            lat: 55.75,
            lng: 37.61,
        };

        // two couriers at the same spot, one farther away
        let near_b = courier(2, branch);
        let near_a = courier(1, branch);
        let far = courier(3, branch);
        for c in [&near_a, &near_b, &far] {
            state.couriers.insert(c.id, c.clone());
        }
        report_position(&state, near_a.id, 55.751, 37.612, None).unwrap();
        report_position(&state, near_b.id, 55.751, 37.612, None).unwrap();
        report_position(&state, far.id, 55.76, 37.63, None).unwrap();

        let found = nearest_couriers(&state, &origin, 5_000.0, 10, |_| true);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].0.id, near_a.id);
        assert_eq!(found[1].0.id, near_b.id);
        assert_eq!(found[2].0.id, far.id);

        let limited = nearest_couriers(&state, &origin, 5_000.0, 1, |_| true);
        assert_eq!(limited.len(), 1);

        let tight = nearest_couriers(&state, &origin, 100.0, 10, |_| true);
        assert!(tight.len() < 3);
    }

    #[test]
    fn nearest_couriers_applies_eligibility_predicate() {
        let state = test_state();
        let branch = Uuid::new_v4();
        let other_branch = Uuid::new_v4();
        let origin = GeoPoint {
            lat: 55.75,
            lng: 37.61,
        };

        let same = courier(1, branch);
        let other = courier(2, other_branch);
        state.couriers.insert(same.id, same.clone());
        state.couriers.insert(other.id, other.clone());
        report_position(&state, same.id, 55.751, 37.612, None).unwrap();
        report_position(&state, other.id, 55.751, 37.612, None).unwrap();

        let found = nearest_couriers(&state, &origin, 5_000.0, 10, |c| c.branch_id == branch);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.id, same.id);
    }
}
