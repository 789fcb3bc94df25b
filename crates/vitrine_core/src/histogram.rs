use crate::{Bucket, Histogram, VitrineError, VitrineResult};

/// Builds an equal-width histogram from `(value, occurrences)` pairs.
///
/// The value range `[min, max]` is split into `min(bucket_count, distinct values)`
/// buckets. Every bucket is half-open except the last one, which also holds `max`.
/// Returns `None` when there is nothing to count.
pub fn build_histogram(
    values: &[(f64, u64)],
    bucket_count: u16,
) -> VitrineResult<Option<Histogram>> {
    if bucket_count == 0 {
        return Err(VitrineError::invalid("histogram bucket count must be positive"));
    }
    let observed = values
        .iter()
        .filter(|(value, occurrences)| value.is_finite() && *occurrences > 0)
        .copied()
        .collect::<Vec<_>>();
    if observed.is_empty() {
        return Ok(None);
    }
    let min = observed
        .iter()
        .map(|(value, _)| *value)
        .fold(f64::INFINITY, f64::min);
    let max = observed
        .iter()
        .map(|(value, _)| *value)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut distinct = observed.iter().map(|(value, _)| *value).collect::<Vec<_>>();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let count = usize::from(bucket_count).min(distinct.len());
    let width = (max - min) / count as f64;
    let mut buckets = (0..count)
        .map(|index| Bucket {
            threshold: min + width * index as f64,
            occurrences: 0,
        })
        .collect::<Vec<_>>();
    for (value, occurrences) in &observed {
        let index = if width > 0.0 {
            (((value - min) / width).floor() as usize).min(count - 1)
        } else {
            0
        };
        buckets[index].occurrences += occurrences;
    }
    let overall_count = buckets.iter().map(|bucket| bucket.occurrences).sum();
    Ok(Some(Histogram {
        min,
        max,
        overall_count,
        buckets,
    }))
}
