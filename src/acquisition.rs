use polars::prelude::*;

use crate::edge_trim::{trim_falling_edge, EdgeTrimError};
use crate::sample_decoder::SampleEvent;

const TIME_COLUMN_NAME: &str = "time";
const CURRENT_COLUMN_NAME: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running,
    Ended,
}

/// Tracks whether an acquisition is in progress.
///
/// Only the thread driving the serial line mutates this.
#[derive(Debug, Default)]
pub struct AcquisitionController {
    state: AcquisitionState,
}

impl AcquisitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// True unless an acquisition is running. An idle controller also reads as ended.
    pub fn is_ended(&self) -> bool {
        self.state != AcquisitionState::Running
    }

    pub fn start(&mut self) {
        self.transition(AcquisitionState::Running);
    }

    pub fn stop(&mut self) {
        self.transition(AcquisitionState::Ended);
    }

    /// Feed a decoded stream event. End of stream only matters while running.
    pub fn observe(&mut self, event: &SampleEvent) {
        if *event == SampleEvent::EndOfStream && self.state == AcquisitionState::Running {
            log::debug!("Device reported end of acquisition");
            self.transition(AcquisitionState::Ended);
        }
    }

    fn transition(&mut self, next: AcquisitionState) {
        log::debug!("Acquisition state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Samples collected during one acquisition, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSequence {
    samples: Vec<f64>,
}

impl SampleSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.samples
    }

    /// Cut everything from the post-peak fall onward. See [`trim_falling_edge`].
    pub fn trim_falling_edge(&self) -> Result<Self, EdgeTrimError> {
        Ok(Self {
            samples: trim_falling_edge(&self.samples)?.to_vec(),
        })
    }

    /// Build a frame with `time` (seconds) and `current` columns.
    ///
    /// `sample_rate_hz` is the `freq` the board was configured with; without it the
    /// time column holds the sample index.
    pub fn to_dataframe(&self, sample_rate_hz: Option<u32>) -> Result<DataFrame, PolarsError> {
        let period = sample_rate_hz.map_or(1.0, |hz| 1.0 / f64::from(hz));
        let times: Vec<f64> = (0..self.samples.len())
            .map(|i| i as f64 * period)
            .collect();

        let time: Column = Series::new(TIME_COLUMN_NAME.into(), times).into();
        let current: Column = Series::new(CURRENT_COLUMN_NAME.into(), &self.samples).into();
        DataFrame::new(vec![time, current])
    }
}

impl From<Vec<f64>> for SampleSequence {
    fn from(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle_and_reads_as_ended() {
        let controller = AcquisitionController::new();
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert!(controller.is_ended());
    }

    #[test]
    fn test_stop_ends_acquisition() {
        let mut controller = AcquisitionController::new();
        controller.start();
        assert!(!controller.is_ended());

        controller.stop();
        assert_eq!(controller.state(), AcquisitionState::Ended);
        assert!(controller.is_ended());

        controller.observe(&SampleEvent::Sample(1.0));
        assert!(controller.is_ended());
    }

    #[test]
    fn test_end_marker_ends_running_acquisition() {
        let mut controller = AcquisitionController::new();
        controller.start();
        controller.observe(&SampleEvent::Noise);
        controller.observe(&SampleEvent::Sample(0.5));
        assert!(!controller.is_ended());

        controller.observe(&SampleEvent::EndOfStream);
        assert_eq!(controller.state(), AcquisitionState::Ended);
        assert!(controller.is_ended());

        controller.start();
        assert_eq!(controller.state(), AcquisitionState::Running);
    }

    #[test]
    fn test_end_marker_while_idle_is_ignored() {
        let mut controller = AcquisitionController::new();
        controller.observe(&SampleEvent::EndOfStream);
        assert_eq!(controller.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_to_dataframe() {
        let sequence = SampleSequence::from(vec![0.1, 0.2, 0.3, 0.4]);
        let df = sequence.to_dataframe(Some(1000)).unwrap();
        assert_eq!(df.height(), 4);

        let time: Vec<f64> = df
            .column(TIME_COLUMN_NAME)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!((time[3] - 0.003).abs() < 1e-12);

        let current: Vec<f64> = df
            .column(CURRENT_COLUMN_NAME)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(current, sequence.as_slice());
    }

    #[test]
    fn test_trim_falling_edge_on_sequence() {
        let sequence = SampleSequence::from(vec![1.0, 2.0, 3.0, 10.0, 4.0, 3.0, 2.0, 1.0]);
        let trimmed = sequence.trim_falling_edge().unwrap();
        assert_eq!(trimmed.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(sequence.len(), 8);
    }
}
