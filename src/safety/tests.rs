use super::validation::{validate_altitude, validate_speed, validate_tolerance};
use super::*;
use crate::error::{PreflightError, SafetyError};
use crate::geo::Coordinate;
use crate::vehicle::{Battery, GpsInfo, VehicleState};
use std::sync::{Arc, Mutex};

fn square_region(include: bool) -> GeofenceRegion {
    GeofenceRegion::new(
        vec![
            GeofencePoint::new(35.72, -78.70),
            GeofencePoint::new(35.72, -78.68),
            GeofencePoint::new(35.74, -78.68),
            GeofencePoint::new(35.74, -78.70),
        ],
        include,
    )
}

fn healthy_state(alt: f64) -> VehicleState {
    VehicleState::test_snapshot(
        Coordinate::new(35.73, -78.69, alt),
        Battery { voltage: 16.2, current: 1.0, percent: 80.0 },
        GpsInfo { fix_type: 3, satellites_visible: 14 },
    )
}

#[test]
fn square_contains_interior_point() {
    let region = square_region(true);
    assert!(region.contains(&GeofencePoint::new(35.73, -78.69)));
    assert!(!region.contains(&GeofencePoint::new(35.73, -78.50)));
    assert!(!region.contains(&GeofencePoint::new(35.75, -78.69)));
}

#[test]
fn empty_region_contains_nothing() {
    let region = GeofenceRegion::new(Vec::new(), true);
    assert!(!region.contains(&GeofencePoint::new(35.73, -78.69)));
    assert!(!region.contains(&GeofencePoint::new(0.0, 0.0)));
    assert!(!region.crossed_by(
        &GeofencePoint::new(35.73, -78.69),
        &GeofencePoint::new(35.73, -78.60),
    ));
}

#[test]
fn segment_intersection_cases() {
    let p = GeofencePoint::new(0.0, 0.0);
    let q = GeofencePoint::new(2.0, 2.0);
    // Proper crossing.
    assert!(segments_intersect(
        &p,
        &q,
        &GeofencePoint::new(0.0, 2.0),
        &GeofencePoint::new(2.0, 0.0),
    ));
    // Parallel, separated.
    assert!(!segments_intersect(
        &p,
        &q,
        &GeofencePoint::new(0.0, 1.0),
        &GeofencePoint::new(2.0, 3.0),
    ));
    // Collinear, overlapping.
    assert!(segments_intersect(
        &p,
        &q,
        &GeofencePoint::new(1.0, 1.0),
        &GeofencePoint::new(3.0, 3.0),
    ));
    // Collinear, disjoint.
    assert!(!segments_intersect(
        &p,
        &q,
        &GeofencePoint::new(3.0, 3.0),
        &GeofencePoint::new(4.0, 4.0),
    ));
}

#[test]
fn boundary_crossing_detected() {
    let region = square_region(true);
    let inside = GeofencePoint::new(35.73, -78.69);
    let outside = GeofencePoint::new(35.73, -78.60);
    let also_inside = GeofencePoint::new(35.735, -78.695);
    assert!(region.crossed_by(&inside, &outside));
    assert!(!region.crossed_by(&inside, &also_inside));
}

#[test]
fn path_check_fails_on_exclude_crossing() {
    let limits = SafetyLimits { exclude_regions: vec![square_region(false)], ..Default::default() };
    let from = Coordinate::new(35.73, -78.75, 10.0);
    let to = Coordinate::new(35.73, -78.69, 10.0);
    let err = limits.check_path(&from, &to).unwrap_err();
    assert!(matches!(err, SafetyError::GeofenceViolation { .. }));

    // Entirely outside the exclude region.
    let clear = Coordinate::new(35.73, -78.71, 10.0);
    limits.check_path(&from, &clear).unwrap();
}

#[test]
fn position_check_honors_include_and_exclude() {
    let limits = SafetyLimits { include_regions: vec![square_region(true)], ..Default::default() };
    limits.check_position(&Coordinate::new(35.73, -78.69, 10.0)).unwrap();
    assert!(limits.check_position(&Coordinate::new(35.73, -78.50, 10.0)).is_err());

    let limits = SafetyLimits { exclude_regions: vec![square_region(false)], ..Default::default() };
    assert!(limits.check_position(&Coordinate::new(35.73, -78.69, 10.0)).is_err());
    limits.check_position(&Coordinate::new(35.73, -78.50, 10.0)).unwrap();
}

#[test]
fn unset_bounds_never_violate() {
    let limits = SafetyLimits::default();
    limits.check_altitude(5000.0).unwrap();
    limits.check_speed(300.0).unwrap();
    limits.check_battery(0.0).unwrap();
    limits.check_position(&Coordinate::new(0.0, 0.0, 0.0)).unwrap();
}

#[test]
fn bounded_limits_flag_excursions() {
    let limits = SafetyLimits {
        max_altitude_m: Some(50.0),
        min_altitude_m: Some(2.0),
        max_speed_m_s: Some(10.0),
        min_battery_percent: Some(20.0),
        ..Default::default()
    };
    limits.check_altitude(30.0).unwrap();
    assert!(limits.check_altitude(60.0).is_err());
    assert!(limits.check_altitude(1.0).is_err());
    assert!(limits.check_speed(12.0).is_err());
    assert!(matches!(
        limits.check_battery(15.0),
        Err(SafetyError::Battery { percent, min_percent })
            if (percent - 15.0).abs() < f64::EPSILON && (min_percent - 20.0).abs() < f64::EPSILON
    ));
}

#[test]
fn parameter_validation_bounds() {
    validate_altitude(30.0).unwrap();
    assert!(validate_altitude(0.5).is_err());
    assert!(validate_altitude(500.0).is_err());
    assert!(validate_altitude(f64::NAN).is_err());
    validate_tolerance(2.0).unwrap();
    assert!(validate_tolerance(0.01).is_err());
    validate_speed(5.0).unwrap();
    assert!(validate_speed(0.0).is_err());
}

#[test]
fn heading_helpers() {
    assert!((normalize_heading(-90.0) - 270.0).abs() < 1e-9);
    assert!((normalize_heading(450.0) - 90.0).abs() < 1e-9);
    assert!((heading_difference(350.0, 10.0) - 20.0).abs() < 1e-9);
    assert!((heading_difference(90.0, 90.0)).abs() < 1e-9);
    assert!((heading_difference(0.0, 180.0) - 180.0).abs() < 1e-9);
}

#[test]
fn preflight_passes_on_healthy_state() {
    PreflightChecks::run_all(&healthy_state(0.0), 10.0).unwrap();
}

#[test]
fn preflight_requires_3d_fix() {
    let state = VehicleState::test_snapshot(
        Coordinate::new(35.73, -78.69, 0.0),
        Battery { voltage: 16.2, current: 1.0, percent: 80.0 },
        GpsInfo { fix_type: 2, satellites_visible: 5 },
    );
    assert!(matches!(
        PreflightChecks::run_all(&state, 10.0),
        Err(PreflightError::Gps { fix_type: 2, .. })
    ));
}

#[test]
fn preflight_rejects_low_battery() {
    let state = VehicleState::test_snapshot(
        Coordinate::new(35.73, -78.69, 0.0),
        Battery { voltage: 13.0, current: 1.0, percent: 8.0 },
        GpsInfo { fix_type: 3, satellites_visible: 14 },
    );
    assert!(matches!(
        PreflightChecks::run_all(&state, 10.0),
        Err(PreflightError::Battery { .. })
    ));
}

#[tokio::test]
async fn monitor_reports_altitude_excursion_to_callbacks() {
    let mut monitor = SafetyMonitor::new(SafetyLimits {
        max_altitude_m: Some(50.0),
        ..Default::default()
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    monitor.on_violation(Box::new(move |kind, _message| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(kind);
        })
    }));

    monitor.check(&healthy_state(100.0)).await;
    assert_eq!(*seen.lock().unwrap(), vec![SafetyViolation::AltitudeExceeded]);

    seen.lock().unwrap().clear();
    monitor.check(&healthy_state(30.0)).await;
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn kml_polygon_parses() {
    let path = std::env::temp_dir().join("geofence_parse_test.kml");
    let body = "<kml><Polygon><coordinates>\n\
                -78.70,35.72,0 -78.68,35.72,0 -78.68,35.74,0 -78.70,35.74,0\n\
                </coordinates></Polygon></kml>";
    std::fs::write(&path, body).unwrap();
    let vertices = read_geofence_kml(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(vertices.len(), 4);
    assert!((vertices[0].lat - 35.72).abs() < 1e-9);
    assert!((vertices[0].lon - -78.70).abs() < 1e-9);
}

#[test]
fn kml_malformed_vertex_rejected() {
    let path = std::env::temp_dir().join("geofence_malformed_test.kml");
    std::fs::write(&path, "<coordinates>-78.70,oops</coordinates>").unwrap();
    let err = read_geofence_kml(path.to_str().unwrap()).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, super::geofence::GeofenceParseError::MalformedVertex(_)));
}
