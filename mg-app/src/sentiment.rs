//! Per-participant sentiment history, keyed by whole seconds.

use dashmap::DashMap;
use mg_messenger::ParticipantId;
use mg_nlu::NluResult;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSample {
    pub timestamp_seconds: i64,
    /// In `[-1, 1]`.
    pub score: f64,
    /// `>= 0`.
    pub magnitude: f64,
    pub source_text: String,
}

impl SentimentSample {
    pub fn new(
        timestamp_seconds: i64,
        score: f64,
        magnitude: f64,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_seconds,
            score: if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) },
            magnitude: if magnitude.is_nan() { 0.0 } else { magnitude.max(0.0) },
            source_text: source_text.into(),
        }
    }

    /// Sample for one NLU turn; a turn without sentiment records a zero sample.
    pub fn from_result(result: &NluResult, timestamp_seconds: i64) -> Self {
        let sentiment = result.sentiment.unwrap_or_default();
        Self::new(
            timestamp_seconds,
            sentiment.score,
            sentiment.magnitude,
            result.query_text.clone(),
        )
    }
}

pub struct SentimentHistory {
    samples: DashMap<ParticipantId, BTreeMap<i64, SentimentSample>>,
    max_samples: Option<usize>,
}

impl SentimentHistory {
    pub fn new(max_samples: Option<usize>) -> Self {
        Self {
            samples: DashMap::new(),
            max_samples: max_samples.filter(|cap| *cap > 0),
        }
    }

    /// Append `sample` and return the participant's previous latest sample.
    ///
    /// Read and write happen under the participant's entry lock. A sample in
    /// the same second as an existing one replaces it.
    pub fn record(
        &self,
        participant: &ParticipantId,
        sample: SentimentSample,
    ) -> Option<SentimentSample> {
        let mut history = self.samples.entry(participant.clone()).or_default();
        let previous = history.last_key_value().map(|(_, s)| s.clone());
        history.insert(sample.timestamp_seconds, sample);
        if let Some(cap) = self.max_samples {
            while history.len() > cap {
                history.pop_first();
            }
        }
        previous
    }

    pub fn latest(&self, participant: &ParticipantId) -> Option<SentimentSample> {
        self.samples
            .get(participant)
            .and_then(|h| h.last_key_value().map(|(_, s)| s.clone()))
    }

    /// Oldest first.
    pub fn samples(&self, participant: &ParticipantId) -> Vec<SentimentSample> {
        self.samples
            .get(participant)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, participant: &ParticipantId) -> usize {
        self.samples.get(participant).map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_nlu::SentimentScore;

    fn sample(ts: i64, score: f64) -> SentimentSample {
        SentimentSample::new(ts, score, score.abs(), format!("text at {ts}"))
    }

    #[test]
    fn record_returns_previous_sample_in_time_order() {
        let history = SentimentHistory::new(None);
        let alice = ParticipantId::new("alice");
        assert!(history.record(&alice, sample(100, 0.2)).is_none());
        let previous = history.record(&alice, sample(101, -0.4)).expect("previous");
        assert_eq!(previous.timestamp_seconds, 100);
        assert_eq!(history.latest(&alice).map(|s| s.score), Some(-0.4));
        assert!(history.samples(&ParticipantId::new("bob")).is_empty());
    }

    #[test]
    fn same_second_samples_overwrite() {
        let history = SentimentHistory::new(None);
        let alice = ParticipantId::new("alice");
        history.record(&alice, sample(100, 0.2));
        let previous = history.record(&alice, sample(100, -0.9)).expect("previous");
        assert_eq!(previous.score, 0.2);
        assert_eq!(history.sample_count(&alice), 1);
        assert_eq!(history.samples(&alice)[0].score, -0.9);
    }

    #[test]
    fn cap_evicts_oldest_samples() {
        let history = SentimentHistory::new(Some(2));
        let alice = ParticipantId::new("alice");
        for ts in 1..=4 {
            history.record(&alice, sample(ts, 0.1));
        }
        let kept: Vec<i64> = history
            .samples(&alice)
            .iter()
            .map(|s| s.timestamp_seconds)
            .collect();
        assert_eq!(kept, vec![3, 4]);
    }

    #[test]
    fn samples_are_clamped_into_range() {
        let s = SentimentSample::new(1, -3.0, -1.0, "x");
        assert_eq!(s.score, -1.0);
        assert_eq!(s.magnitude, 0.0);
        assert_eq!(SentimentSample::new(1, f64::NAN, 0.5, "x").score, 0.0);
    }

    #[test]
    fn result_without_sentiment_becomes_zero_sample() {
        let result = NluResult {
            query_text: "hi".to_string(),
            ..NluResult::default()
        };
        let s = SentimentSample::from_result(&result, 7);
        assert_eq!((s.score, s.magnitude), (0.0, 0.0));
        assert_eq!(s.source_text, "hi");

        let negative = NluResult {
            sentiment: Some(SentimentScore {
                score: -0.8,
                magnitude: 1.2,
            }),
            ..result
        };
        assert_eq!(SentimentSample::from_result(&negative, 8).score, -0.8);
    }
}
