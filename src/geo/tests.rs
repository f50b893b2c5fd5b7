use super::{Coordinate, VectorNED};
use rand::Rng;

const LAKE_WHEELER: Coordinate = Coordinate::new(35.7274, -78.6960, 0.0);

#[test]
fn test_distance_symmetry_and_identity() {
    let mut rng = rand::rng();
    for _ in 0..50 {
        let a = Coordinate::new(
            rng.random_range(-60.0..60.0),
            rng.random_range(-179.0..179.0),
            rng.random_range(0.0..100.0),
        );
        let b = Coordinate::new(
            rng.random_range(-60.0..60.0),
            rng.random_range(-179.0..179.0),
            rng.random_range(0.0..100.0),
        );
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }
}

#[test]
fn test_displacement_round_trip() {
    let v = VectorNED::new(120.0, -45.0, 10.0);
    let there = LAKE_WHEELER + v;
    let back = there - v;
    assert!((back.lat() - LAKE_WHEELER.lat()).abs() < 1e-9);
    // The east component is re-projected at the displaced latitude on the
    // way back, so longitude only closes to sub-millimeter, not exactly.
    assert!((back.lon() - LAKE_WHEELER.lon()).abs() < 1e-7);
    assert!((back.alt() - LAKE_WHEELER.alt()).abs() < 1e-9);
}

#[test]
fn test_100m_north_displacement() {
    let moved = LAKE_WHEELER + VectorNED::new(100.0, 0.0, 0.0);
    let dist = moved.distance(&LAKE_WHEELER);
    assert!((dist - 100.0).abs() < 2.0, "distance was {dist}");
    let bearing = LAKE_WHEELER.bearing(&moved);
    assert!(bearing < 1.0 || bearing > 359.0, "bearing was {bearing}");
}

#[test]
fn test_bearing_cardinal_directions() {
    let east = LAKE_WHEELER + VectorNED::new(0.0, 50.0, 0.0);
    let south = LAKE_WHEELER + VectorNED::new(-50.0, 0.0, 0.0);
    assert!((LAKE_WHEELER.bearing(&east) - 90.0).abs() < 1.0);
    assert!((LAKE_WHEELER.bearing(&south) - 180.0).abs() < 1.0);
    assert_eq!(LAKE_WHEELER.bearing(&LAKE_WHEELER), 0.0);
}

#[test]
fn test_down_lowers_altitude() {
    let at_alt = LAKE_WHEELER.with_alt(30.0);
    let sunk = at_alt + VectorNED::new(0.0, 0.0, 10.0);
    assert!((sunk.alt() - 20.0).abs() < 1e-9);
}

#[test]
fn test_vector_rotation() {
    let north = VectorNED::new(1.0, 0.0, 0.0);
    let rotated = north.rotate_by_angle(90.0);
    // 90 degrees counterclockwise from above turns north into west.
    assert!(rotated.north().abs() < 1e-9);
    assert!((rotated.east() + 1.0).abs() < 1e-9);
    let full = north.rotate_by_angle(360.0);
    assert!((full.north() - 1.0).abs() < 1e-9);
}

#[test]
fn test_vector_algebra() {
    let a = VectorNED::new(3.0, 4.0, 0.0);
    assert_eq!(a.hypot(false), 5.0);
    assert_eq!(a.hypot(true), 5.0);
    let with_down = VectorNED::new(3.0, 4.0, 12.0);
    assert_eq!(with_down.hypot(false), 13.0);
    assert_eq!(with_down.hypot(true), 5.0);

    let unit = a.norm();
    assert!((unit.hypot(false) - 1.0).abs() < 1e-12);
    assert_eq!(VectorNED::zero().norm(), VectorNED::zero());

    let sum = a + VectorNED::new(1.0, 1.0, 1.0);
    assert_eq!(sum, VectorNED::new(4.0, 5.0, 1.0));
    assert_eq!(a * 2.0, VectorNED::new(6.0, 8.0, 0.0));

    let n = VectorNED::new(1.0, 0.0, 0.0);
    let e = VectorNED::new(0.0, 1.0, 0.0);
    // NED is a right-handed frame, so north x east points down.
    assert_eq!(n.cross(&e), VectorNED::new(0.0, 0.0, 1.0));
    assert_eq!(n.dot(&e), 0.0);
}

#[test]
fn test_coordinate_difference_matches_displacement() {
    let v = VectorNED::new(250.0, -80.0, 0.0);
    let there = LAKE_WHEELER + v;
    let diff = there - LAKE_WHEELER;
    assert!((diff.north() - v.north()).abs() < 1.0, "north {}", diff.north());
    assert!((diff.east() - v.east()).abs() < 1.0, "east {}", diff.east());
}
