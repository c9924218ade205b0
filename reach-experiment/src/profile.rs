//! Velocity-profile metrics over a recorded reach path.

use reach_core::{MovementProfile, PathPoint};

/// Minimum prominence (px/s) for a local velocity maximum to count as a peak.
pub const PEAK_PROMINENCE: f64 = 50.0;

/// Instantaneous speed between consecutive points, in px/s. Pairs without a
/// positive time step are skipped.
pub fn velocities(path: &[PathPoint]) -> Vec<f64> {
    path.windows(2)
        .filter_map(|w| {
            let dt = step_seconds(&w[0], &w[1])?;
            Some(distance(&w[0], &w[1]) / dt)
        })
        .collect()
}

pub fn analyze(path: &[PathPoint]) -> MovementProfile {
    if path.len() < 3 {
        return MovementProfile::default();
    }

    let length: f64 = path.windows(2).map(|w| distance(&w[0], &w[1])).sum();
    let path_efficiency = if length > 0.0 {
        distance(&path[0], &path[path.len() - 1]) / length
    } else {
        0.0
    };

    let v = velocities(path);
    if v.is_empty() {
        return MovementProfile {
            path_efficiency,
            ..MovementProfile::default()
        };
    }

    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let variance = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let peak = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    MovementProfile {
        mean_velocity: mean,
        peak_velocity: peak,
        speed_variance: variance,
        velocity_peaks: count_peaks(&v, PEAK_PROMINENCE),
        jerk: mean_abs_jerk(path),
        path_efficiency,
    }
}

fn distance(a: &PathPoint, b: &PathPoint) -> f64 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Local maxima (flat tops count once) whose prominence reaches `min_prominence`.
fn count_peaks(v: &[f64], min_prominence: f64) -> u32 {
    if v.len() < 3 {
        return 0;
    }

    let mut count = 0;
    let mut i = 1;
    while i + 1 < v.len() {
        if v[i - 1] < v[i] {
            let mut ahead = i + 1;
            while ahead < v.len() && v[ahead] == v[i] {
                ahead += 1;
            }
            if ahead < v.len() && v[ahead] < v[i] {
                if prominence(v, i) >= min_prominence {
                    count += 1;
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    count
}

/// Height of the peak above the higher of its two bases. Each base is the
/// lowest value before the signal rises above the peak or ends.
fn prominence(v: &[f64], i: usize) -> f64 {
    let peak = v[i];

    let mut left_min = peak;
    for &x in v[..i].iter().rev() {
        if x > peak {
            break;
        }
        left_min = left_min.min(x);
    }

    let mut right_min = peak;
    for &x in &v[i + 1..] {
        if x > peak {
            break;
        }
        right_min = right_min.min(x);
    }

    peak - left_min.max(right_min)
}

/// Time step between two points in seconds, `None` unless positive.
fn step_seconds(a: &PathPoint, b: &PathPoint) -> Option<f64> {
    let dt = b.t.checked_sub(a.t).filter(|&dt| dt > 0)?;
    Some(dt as f64 / 1000.0)
}

/// Mean absolute change between consecutive accelerations. Each acceleration
/// is the speed change over a point triple divided by its second time step.
fn mean_abs_jerk(path: &[PathPoint]) -> f64 {
    if path.len() < 4 {
        return 0.0;
    }
    let acc: Vec<f64> = path
        .windows(3)
        .filter_map(|w| {
            let dt1 = step_seconds(&w[0], &w[1])?;
            let dt2 = step_seconds(&w[1], &w[2])?;
            let v1 = distance(&w[0], &w[1]) / dt1;
            let v2 = distance(&w[1], &w[2]) / dt2;
            Some((v2 - v1) / dt2)
        })
        .collect();
    if acc.len() < 2 {
        return 0.0;
    }
    let jerks: Vec<f64> = acc.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    jerks.iter().sum::<f64>() / jerks.len() as f64
}
