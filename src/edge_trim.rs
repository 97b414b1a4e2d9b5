//! Isolating a current burst from the idle tail that follows it.

/// Fraction of the observed dynamic range the signal must fall after its peak.
pub const FALL_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeTrimError {
    #[error("Cannot trim an empty sample sequence")]
    Empty,
}

/// Return the prefix of `samples` that ends where the post-peak fall begins.
///
/// The fall point is the first sample lying more than half the sequence's
/// `max - min` range below the running peak. From there the index walks back
/// while the signal is still descending, landing on the last sample before the
/// descent. If the signal never falls that far the whole sequence is returned.
pub fn trim_falling_edge(samples: &[f64]) -> Result<&[f64], EdgeTrimError> {
    if samples.is_empty() {
        return Err(EdgeTrimError::Empty);
    }

    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let threshold = (max - min) * FALL_RATIO;

    let mut peak = 0.0;
    let mut fall_index = None;
    for (i, &sample) in samples.iter().enumerate() {
        if sample > peak {
            peak = sample;
        } else if peak - sample > threshold {
            fall_index = Some(i);
            break;
        }
    }

    let Some(mut index) = fall_index else {
        log::debug!("No falling edge in {} samples, keeping all", samples.len());
        return Ok(samples);
    };

    while index > 0 && samples[index] < samples[index - 1] {
        index -= 1;
    }

    log::debug!(
        "Trimmed {} samples to {} at falling edge",
        samples.len(),
        index
    );
    Ok(&samples[..index])
}
