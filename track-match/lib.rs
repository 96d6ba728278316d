//! Brute-force descriptor matching between two frames.
//!
//! Every query row is compared with every train row under the metric that
//! belongs to the descriptor element type. Selection is one of plain
//! nearest neighbor, k-nearest neighbor with the distance-ratio test, or
//! cross-checked nearest neighbor. Results are deterministic: ties resolve to
//! the lowest train index and output is ordered by query index.

pub mod distance;

use log::{debug, warn};
use rayon::prelude::*;
use track_core::{
    DescriptorKind, Descriptors, DistanceMetric, Keypoint, Match, MatcherConfig, SelectorKind,
    TrackError, TrackResult,
};

pub use distance::{hamming, l2};

/// Descriptor matcher with a fixed selection policy and metric
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    config: MatcherConfig,
    metric: DistanceMetric,
}

impl Matcher {
    pub fn new(config: MatcherConfig, metric: DistanceMetric) -> TrackResult<Self> {
        config.validate()?;
        if config.selector == SelectorKind::KNearestNeighbor && config.k < 2 {
            warn!(
                "KNN matching with k = {} cannot run the ratio test; every query will be discarded",
                config.k
            );
        }
        Ok(Self { config, metric })
    }

    /// Matcher using the metric that fits the descriptor's element type
    pub fn for_descriptor(config: MatcherConfig, kind: DescriptorKind) -> TrackResult<Self> {
        Self::new(config, kind.metric())
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Match two frames' features; indices in the result refer to the keypoint slices.
    pub fn match_frames(
        &self,
        query_keypoints: &[Keypoint],
        train_keypoints: &[Keypoint],
        query: &Descriptors,
        train: &Descriptors,
    ) -> TrackResult<Vec<Match>> {
        if query_keypoints.len() != query.len() {
            return Err(TrackError::IncompatibleDescriptors(format!(
                "query frame has {} keypoints but {} descriptors",
                query_keypoints.len(),
                query.len()
            )));
        }
        if train_keypoints.len() != train.len() {
            return Err(TrackError::IncompatibleDescriptors(format!(
                "train frame has {} keypoints but {} descriptors",
                train_keypoints.len(),
                train.len()
            )));
        }
        self.match_descriptors(query, train)
    }

    pub fn match_descriptors(
        &self,
        query: &Descriptors,
        train: &Descriptors,
    ) -> TrackResult<Vec<Match>> {
        self.check_compatible(query, train)?;
        if query.is_empty() || train.is_empty() {
            debug!(
                "Nothing to match ({} query, {} train descriptors)",
                query.len(),
                train.len()
            );
            return Ok(Vec::new());
        }

        let matches = match (query, train) {
            (Descriptors::Binary(q), Descriptors::Binary(t)) => {
                self.select(q, t, |a: &[u8], b: &[u8]| hamming(a, b) as f32)
            }
            (Descriptors::Float(q), Descriptors::Float(t)) => self.select(q, t, l2),
            _ => {
                return Err(TrackError::IncompatibleDescriptors(
                    "query and train descriptors have different element types".to_string(),
                ))
            }
        };
        debug!(
            "Matched {} of {} query descriptors against {} train descriptors",
            matches.len(),
            query.len(),
            train.len()
        );
        Ok(matches)
    }

    fn check_compatible(&self, query: &Descriptors, train: &Descriptors) -> TrackResult<()> {
        let expected = self.metric.element_type();
        for (side, set) in [("query", query), ("train", train)] {
            if set.element_type() != expected {
                return Err(TrackError::IncompatibleDescriptors(format!(
                    "{:?} metric cannot compare {:?} {} descriptors",
                    self.metric,
                    set.element_type(),
                    side
                )));
            }
            if !rows_uniform(set) {
                return Err(TrackError::IncompatibleDescriptors(format!(
                    "{} descriptor rows differ in length",
                    side
                )));
            }
        }
        if let (Some(q), Some(t)) = (query.dimension(), train.dimension()) {
            if q != t {
                return Err(TrackError::IncompatibleDescriptors(format!(
                    "query dimension {} does not match train dimension {}",
                    q, t
                )));
            }
        }
        Ok(())
    }

    fn select<T, F>(&self, query: &[Vec<T>], train: &[Vec<T>], dist: F) -> Vec<Match>
    where
        T: Sync,
        F: Fn(&[T], &[T]) -> f32 + Sync,
    {
        if self.config.cross_check {
            return cross_checked(query, train, &dist);
        }
        match self.config.selector {
            SelectorKind::NearestNeighbor => query
                .par_iter()
                .enumerate()
                .filter_map(|(qi, q)| {
                    nearest(q, train, &dist).map(|(ti, d)| Match {
                        query_idx: qi,
                        train_idx: ti,
                        distance: d,
                    })
                })
                .collect(),
            SelectorKind::KNearestNeighbor => {
                let (k, ratio) = (self.config.k, self.config.ratio);
                query
                    .par_iter()
                    .enumerate()
                    .filter_map(|(qi, q)| ratio_test(qi, q, train, k, ratio, &dist))
                    .collect()
            }
        }
    }
}

fn rows_uniform(set: &Descriptors) -> bool {
    match set {
        Descriptors::Binary(rows) => rows.windows(2).all(|w| w[0].len() == w[1].len()),
        Descriptors::Float(rows) => rows.windows(2).all(|w| w[0].len() == w[1].len()),
    }
}

/// Closest row and its distance; the lowest index wins ties
fn nearest<T, F>(row: &[T], candidates: &[Vec<T>], dist: &F) -> Option<(usize, f32)>
where
    F: Fn(&[T], &[T]) -> f32,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, c) in candidates.iter().enumerate() {
        let d = dist(row, c.as_slice());
        match best {
            Some((_, bd)) if d >= bd => {}
            _ => best = Some((i, d)),
        }
    }
    best
}

/// The `k` closest rows ordered by (distance, index)
pub(crate) fn k_nearest<T, F>(
    row: &[T],
    candidates: &[Vec<T>],
    k: usize,
    dist: &F,
) -> Vec<(usize, f32)>
where
    F: Fn(&[T], &[T]) -> f32,
{
    let mut all: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, dist(row, c.as_slice())))
        .collect();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all.truncate(k);
    all
}

fn ratio_test<T, F>(
    query_idx: usize,
    row: &[T],
    train: &[Vec<T>],
    k: usize,
    ratio: f32,
    dist: &F,
) -> Option<Match>
where
    F: Fn(&[T], &[T]) -> f32,
{
    let candidates = k_nearest(row, train, k, dist);
    if candidates.len() < 2 {
        return None;
    }
    let (best_idx, best) = candidates[0];
    let second = candidates[1].1;
    // best / second < ratio, written so that a zero second distance discards
    if best < ratio * second {
        Some(Match {
            query_idx,
            train_idx: best_idx,
            distance: best,
        })
    } else {
        None
    }
}

fn cross_checked<T, F>(query: &[Vec<T>], train: &[Vec<T>], dist: &F) -> Vec<Match>
where
    T: Sync,
    F: Fn(&[T], &[T]) -> f32 + Sync,
{
    let backward: Vec<Option<usize>> = train
        .par_iter()
        .map(|t| nearest(t, query, dist).map(|(qi, _)| qi))
        .collect();

    query
        .par_iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, d) = nearest(q, train, dist)?;
            (backward[ti] == Some(qi)).then_some(Match {
                query_idx: qi,
                train_idx: ti,
                distance: d,
            })
        })
        .collect()
}
