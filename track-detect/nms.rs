use rayon::prelude::*;

use crate::types::ScoredCorner;

/// Strict 3x3 local maxima of a dense row-major score map.
///
/// Pixels closer than `border` to the edge and scores not above `min_score`
/// are skipped. A neighbour that comes earlier in raster order must be
/// strictly lower while a later one may tie, so a flat plateau leaves
/// exactly one survivor. Output is in raster order.
pub fn local_maxima_3x3(
    scores: &[f32],
    width: usize,
    height: usize,
    border: usize,
    min_score: f32,
) -> Vec<ScoredCorner> {
    let border = border.max(1);
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    (border..height - border)
        .into_par_iter()
        .flat_map_iter(|y| {
            (border..width - border).filter_map(move |x| {
                let s = scores[y * width + x];
                if s <= min_score {
                    return None;
                }
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = (x as i32 + dx) as usize;
                        let ny = (y as i32 + dy) as usize;
                        let n = scores[ny * width + nx];
                        let earlier = dy < 0 || (dy == 0 && dx < 0);
                        if (earlier && n >= s) || (!earlier && n > s) {
                            return None;
                        }
                    }
                }
                Some(ScoredCorner { x, y, score: s })
            })
        })
        .collect()
}

/// Greedy distance suppression: strongest first, a candidate survives only if
/// no survivor lies closer than `min_distance`.
///
/// Equal scores keep their input order. Survivors are returned strongest first.
pub fn suppress_within_radius(candidates: &[ScoredCorner], min_distance: f32) -> Vec<ScoredCorner> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    if min_distance <= 0.0 {
        return sorted;
    }

    // Bucket survivors on a grid of min_distance cells so each check touches 3x3 cells
    let cell = min_distance.ceil().max(1.0) as usize;
    let max_x = sorted.iter().map(|c| c.x).max().unwrap_or(0);
    let max_y = sorted.iter().map(|c| c.y).max().unwrap_or(0);
    let grid_w = max_x / cell + 1;
    let grid_h = max_y / cell + 1;
    let mut grid: Vec<Vec<(f32, f32)>> = vec![Vec::new(); grid_w * grid_h];

    let min_distance_sq = min_distance * min_distance;
    let mut kept = Vec::new();
    for candidate in sorted {
        let gx = candidate.x / cell;
        let gy = candidate.y / cell;
        let (cx, cy) = (candidate.x as f32, candidate.y as f32);

        let mut is_isolated = true;
        'cells: for ny in gy.saturating_sub(1)..=(gy + 1).min(grid_h - 1) {
            for nx in gx.saturating_sub(1)..=(gx + 1).min(grid_w - 1) {
                for &(px, py) in &grid[ny * grid_w + nx] {
                    let (dx, dy) = (cx - px, cy - py);
                    if dx * dx + dy * dy < min_distance_sq {
                        is_isolated = false;
                        break 'cells;
                    }
                }
            }
        }

        if is_isolated {
            grid[gy * grid_w + gx].push((cx, cy));
            kept.push(candidate);
        }
    }
    kept
}
