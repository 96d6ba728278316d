use log::debug;
use track_core::{Keypoint, Region};

/// Optional region-of-interest stage; disabled means identity
#[derive(Debug, Clone, Copy)]
pub struct RegionFilter {
    enabled: bool,
    region: Region,
}

impl RegionFilter {
    pub fn new(enabled: bool, region: Region) -> Self {
        Self { enabled, region }
    }

    pub fn disabled() -> Self {
        Self::new(false, Region::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn apply(&self, keypoints: Vec<Keypoint>) -> Vec<Keypoint> {
        if !self.enabled {
            return keypoints;
        }
        let total = keypoints.len();
        let kept = filter_to_region(keypoints, &self.region);
        debug!("Region filter kept {} of {} keypoints", kept.len(), total);
        kept
    }
}

/// Keypoints whose position lies in the half-open rectangle, order preserved
pub fn filter_to_region(keypoints: Vec<Keypoint>, region: &Region) -> Vec<Keypoint> {
    keypoints
        .into_iter()
        .filter(|kp| region.contains(kp.x, kp.y))
        .collect()
}

/// How the limiter decides which keypoints survive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    /// Highest response first, ties keep input order
    ByResponse,
    /// Input order is already quality-descending; keep the head
    DetectorOrder,
}

/// Optional keypoint-count cap; disabled means identity
#[derive(Debug, Clone, Copy)]
pub struct KeypointLimiter {
    enabled: bool,
    max_count: usize,
    ranking: Ranking,
}

impl KeypointLimiter {
    pub fn new(enabled: bool, max_count: usize, ranking: Ranking) -> Self {
        Self {
            enabled,
            max_count,
            ranking,
        }
    }

    /// Ranking follows whether the detector fills in responses
    pub fn for_detector(enabled: bool, max_count: usize, provides_response: bool) -> Self {
        let ranking = if provides_response {
            Ranking::ByResponse
        } else {
            Ranking::DetectorOrder
        };
        Self::new(enabled, max_count, ranking)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn ranking(&self) -> Ranking {
        self.ranking
    }

    pub fn apply(&self, keypoints: Vec<Keypoint>) -> Vec<Keypoint> {
        if !self.enabled {
            return keypoints;
        }
        limit(keypoints, self.max_count, self.ranking)
    }
}

/// Keep at most `max_count` keypoints according to `ranking`
pub fn limit(mut keypoints: Vec<Keypoint>, max_count: usize, ranking: Ranking) -> Vec<Keypoint> {
    match ranking {
        Ranking::DetectorOrder => {
            keypoints.truncate(max_count);
            keypoints
        }
        Ranking::ByResponse => {
            // Stable sort so equal responses keep their input order
            keypoints.sort_by(|a, b| {
                let ra = a.response.unwrap_or(f32::NEG_INFINITY);
                let rb = b.response.unwrap_or(f32::NEG_INFINITY);
                rb.total_cmp(&ra)
            });
            keypoints.truncate(max_count);
            keypoints
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kp(x: f32, y: f32, response: Option<f32>) -> Keypoint {
        let k = Keypoint::new(x, y, 7.0);
        match response {
            Some(r) => k.with_response(r),
            None => k,
        }
    }

    #[test]
    fn test_region_bounds_half_open() {
        let region = Region::new(10.0, 20.0, 5.0, 5.0);
        let kps = vec![
            kp(10.0, 20.0, None),
            kp(15.0, 22.0, None),
            kp(14.9, 24.9, None),
            kp(12.0, 25.0, None),
        ];
        let kept = filter_to_region(kps, &region);
        let positions: Vec<(f32, f32)> = kept.iter().map(|k| (k.x, k.y)).collect();
        assert_eq!(positions, vec![(10.0, 20.0), (14.9, 24.9)]);
    }

    #[test]
    fn test_disabled_stages_are_identity() {
        let kps = vec![kp(0.0, 0.0, Some(1.0)), kp(900.0, 900.0, Some(5.0))];
        assert_eq!(RegionFilter::disabled().apply(kps.clone()), kps);
        let limiter = KeypointLimiter::new(false, 0, Ranking::ByResponse);
        assert_eq!(limiter.apply(kps.clone()), kps);
    }

    #[test]
    fn test_limit_zero_is_empty() {
        let kps = vec![kp(1.0, 1.0, Some(1.0))];
        assert!(limit(kps.clone(), 0, Ranking::ByResponse).is_empty());
        assert!(limit(kps, 0, Ranking::DetectorOrder).is_empty());
    }

    #[test]
    fn test_limit_by_response_is_stable() {
        let kps = vec![
            kp(0.0, 0.0, Some(2.0)),
            kp(1.0, 0.0, Some(9.0)),
            kp(2.0, 0.0, Some(2.0)),
            kp(3.0, 0.0, Some(5.0)),
        ];
        let kept = limit(kps, 3, Ranking::ByResponse);
        let xs: Vec<f32> = kept.iter().map(|k| k.x).collect();
        assert_eq!(xs, vec![1.0, 3.0, 0.0]);
    }

    #[test]
    fn test_limiter_for_responseless_detector_truncates() {
        let kps: Vec<Keypoint> = (0..10).map(|i| kp(i as f32, 0.0, None)).collect();
        let limiter = KeypointLimiter::for_detector(true, 4, false);
        assert_eq!(limiter.ranking(), Ranking::DetectorOrder);
        let kept = limiter.apply(kps.clone());
        assert_eq!(kept, kps[..4].to_vec());
    }

    fn arb_keypoints() -> impl Strategy<Value = Vec<Keypoint>> {
        prop::collection::vec((0.0f32..1300.0, 0.0f32..400.0, 0u16..50), 0..200).prop_map(|v| {
            v.into_iter()
                .map(|(x, y, r)| kp(x, y, Some(r as f32)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_region_filter_keeps_exactly_inside(kps in arb_keypoints()) {
            let region = Region::default();
            let kept = RegionFilter::new(true, region).apply(kps.clone());
            let expected: Vec<Keypoint> =
                kps.iter().copied().filter(|k| region.contains(k.x, k.y)).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn prop_limit_size_and_top_m(kps in arb_keypoints(), m in 0usize..250) {
            let kept = limit(kps.clone(), m, Ranking::ByResponse);
            prop_assert_eq!(kept.len(), kps.len().min(m));
            if let Some(min_kept) = kept.iter().filter_map(|k| k.response).reduce(f32::min) {
                let strictly_greater = kps
                    .iter()
                    .filter(|k| k.response.unwrap_or(f32::NEG_INFINITY) > min_kept)
                    .count();
                prop_assert!(strictly_greater <= kept.len());
            }
            prop_assert!(kept.windows(2).all(|w| w[0].response >= w[1].response));
        }

        #[test]
        fn prop_truncation_keeps_prefix(kps in arb_keypoints(), m in 0usize..250) {
            let kept = limit(kps.clone(), m, Ranking::DetectorOrder);
            prop_assert_eq!(&kept[..], &kps[..kps.len().min(m)]);
        }
    }
}
