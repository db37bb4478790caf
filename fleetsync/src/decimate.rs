//! Spatial marker decimation.
//!
//! Reduces a marker set to at most `max_count` representatives that are at
//! least `min_separation_m` apart. The pass is greedy and single-sweep:
//!
//! ```text
//! for entity in stable order:
//!     if |kept| == max_count: stop
//!     if entity is within min_separation of any kept: absorb (skip)
//!     else: keep
//! ```
//!
//! The kept representative of a cluster is its first-encountered member; no
//! averaging or recentering. Output depends only on input order, so callers
//! must pass a stable order (e.g. sorted by unit id) to avoid flicker between
//! frames. Cost is O(n · max_count) distance checks, bounded by the early
//! stop at the cap.

use crate::geo::haversine_distance;
use crate::lod::DecimationParams;

/// Reduce `entities` to a bounded, well-separated subset.
///
/// - `max_count = None` is the identity: the input is returned unchanged.
/// - `min_separation_m <= 0` disables absorption; the result is the first
///   `max_count` entities.
///
/// The result preserves input order and every element comes from the input.
pub fn decimate<T, F>(
    entities: Vec<T>,
    position_of: F,
    max_count: Option<usize>,
    min_separation_m: f64,
) -> Vec<T>
where
    F: Fn(&T) -> (f64, f64),
{
    let Some(max_count) = max_count else {
        return entities;
    };

    let mut kept: Vec<T> = Vec::with_capacity(max_count.min(entities.len()));
    let mut kept_positions: Vec<(f64, f64)> = Vec::with_capacity(kept.capacity());

    for entity in entities {
        if kept.len() >= max_count {
            break;
        }

        let (lat, lon) = position_of(&entity);
        let absorbed = min_separation_m > 0.0
            && kept_positions
                .iter()
                .any(|&(k_lat, k_lon)| haversine_distance(k_lat, k_lon, lat, lon) < min_separation_m);

        if !absorbed {
            kept.push(entity);
            kept_positions.push((lat, lon));
        }
    }

    kept
}

/// [`decimate`] with parameters taken from an LOD tier.
pub fn decimate_with<T, F>(entities: Vec<T>, position_of: F, params: &DecimationParams) -> Vec<T>
where
    F: Fn(&T) -> (f64, f64),
{
    decimate(
        entities,
        position_of,
        params.max_count,
        params.min_separation_m.unwrap_or(0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_meters;
    use proptest::prelude::*;

    const ORIGIN: (f64, f64) = (53.55, 9.99);

    /// Points on a grid with the given spacing, row-major.
    fn grid(n: usize, spacing_m: f64) -> Vec<(usize, f64, f64)> {
        let side = (n as f64).sqrt().ceil() as usize;
        (0..n)
            .map(|i| {
                let (lat, lon) = offset_meters(
                    ORIGIN.0,
                    ORIGIN.1,
                    (i / side) as f64 * spacing_m,
                    (i % side) as f64 * spacing_m,
                );
                (i, lat, lon)
            })
            .collect()
    }

    fn pos(p: &(usize, f64, f64)) -> (f64, f64) {
        (p.1, p.2)
    }

    #[test]
    fn test_unbounded_is_identity() {
        let input = grid(50, 1.0);
        let output = decimate(input.clone(), pos, None, 100.0);
        assert_eq!(output, input);
    }

    #[test]
    fn test_cap_bounds_output_exactly() {
        let input = grid(100, 500.0);
        let output = decimate(input, pos, Some(40), 100.0);
        assert_eq!(output.len(), 40);
        let ids: Vec<usize> = output.iter().map(|p| p.0).collect();
        assert_eq!(ids, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_points_are_absorbed_by_first() {
        let (lat, lon) = ORIGIN;
        let (near_lat, near_lon) = offset_meters(lat, lon, 30.0, 0.0);
        let (far_lat, far_lon) = offset_meters(lat, lon, 1_000.0, 0.0);
        let input = vec![(0, lat, lon), (1, near_lat, near_lon), (2, far_lat, far_lon)];

        let output = decimate(input, pos, Some(10), 100.0);

        let ids: Vec<usize> = output.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_zero_separation_truncates() {
        let input = grid(10, 1.0);
        let output = decimate(input, pos, Some(3), 0.0);
        let ids: Vec<usize> = output.iter().map(|p| p.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_cap_is_empty() {
        let output = decimate(grid(5, 500.0), pos, Some(0), 100.0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_order_determines_representative() {
        let (lat, lon) = ORIGIN;
        let (near_lat, near_lon) = offset_meters(lat, lon, 10.0, 0.0);
        let forward = vec![(0, lat, lon), (1, near_lat, near_lon)];
        let backward = vec![(1, near_lat, near_lon), (0, lat, lon)];

        assert_eq!(decimate(forward, pos, Some(5), 100.0)[0].0, 0);
        assert_eq!(decimate(backward, pos, Some(5), 100.0)[0].0, 1);
    }

    #[test]
    fn test_decimate_with_disabled_params_is_identity() {
        let params = DecimationParams {
            max_count: None,
            min_separation_m: None,
        };
        let input = grid(20, 1.0);
        assert_eq!(decimate_with(input.clone(), pos, &params), input);
    }

    proptest! {
        #[test]
        fn prop_output_is_bounded_separated_subset(
            offsets in prop::collection::vec((0.0f64..5_000.0, 0.0f64..5_000.0), 0..120),
            cap in 1usize..60,
            separation in 10.0f64..800.0,
        ) {
            let input: Vec<(usize, f64, f64)> = offsets
                .iter()
                .enumerate()
                .map(|(i, &(n, e))| {
                    let (lat, lon) = offset_meters(ORIGIN.0, ORIGIN.1, n, e);
                    (i, lat, lon)
                })
                .collect();

            let output = decimate(input.clone(), pos, Some(cap), separation);

            prop_assert!(output.len() <= cap);
            // Subset, in input order.
            let mut last = None;
            for p in &output {
                prop_assert!(input.contains(p));
                prop_assert!(last.map_or(true, |l| p.0 > l));
                last = Some(p.0);
            }
            for (i, a) in output.iter().enumerate() {
                for b in &output[i + 1..] {
                    prop_assert!(haversine_distance(a.1, a.2, b.1, b.2) >= separation);
                }
            }
        }
    }
}
