//! Sentiment escalation policy.
//!
//! A pure, ordered decision table: the first rule whose predicate holds
//! decides. `ESCALATION_RULES` is the order.

use crate::config::EscalationConfig;
use crate::sentiment::SentimentSample;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    None,
    /// Ask the user whether the bot said something wrong.
    SoftCheck,
    /// Hand the conversation to a human operator.
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscalationThresholds {
    /// Swing between consecutive scores that triggers a soft check.
    pub soft_check_delta: f64,
    /// Soft checks only apply to scores above this (mildly negative).
    pub soft_check_floor: f64,
    pub escalate_below: f64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            soft_check_delta: 0.5,
            soft_check_floor: -0.6,
            escalate_below: -0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRule {
    NoSentimentResult,
    SoftCheckOnSwing,
    EscalateOnNegative,
    Otherwise,
}

pub const ESCALATION_RULES: [EscalationRule; 4] = [
    EscalationRule::NoSentimentResult,
    EscalationRule::SoftCheckOnSwing,
    EscalationRule::EscalateOnNegative,
    EscalationRule::Otherwise,
];

struct Turn {
    has_result: bool,
    score: f64,
    delta: f64,
}

impl EscalationRule {
    fn matches(self, turn: &Turn, t: &EscalationThresholds) -> bool {
        match self {
            Self::NoSentimentResult => !turn.has_result,
            Self::SoftCheckOnSwing => {
                turn.delta > t.soft_check_delta
                    && turn.score < 0.0
                    && turn.score > t.soft_check_floor
            }
            Self::EscalateOnNegative => turn.score < t.escalate_below,
            Self::Otherwise => true,
        }
    }

    fn outcome(self) -> Decision {
        match self {
            Self::NoSentimentResult | Self::Otherwise => Decision::None,
            Self::SoftCheckOnSwing => Decision::SoftCheck,
            Self::EscalateOnNegative => Decision::Escalate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationPolicy {
    thresholds: EscalationThresholds,
}

impl EscalationPolicy {
    pub fn new(thresholds: EscalationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(cfg: &EscalationConfig) -> Self {
        Self::new(EscalationThresholds {
            soft_check_delta: cfg.soft_check_delta,
            soft_check_floor: cfg.soft_check_floor,
            escalate_below: cfg.escalate_below,
        })
    }

    pub fn decide(
        &self,
        sample: &SentimentSample,
        has_sentiment_result: bool,
        previous: Option<&SentimentSample>,
    ) -> Decision {
        self.evaluate(sample, has_sentiment_result, previous).1
    }

    /// Like `decide`, also naming the rule that fired.
    pub fn evaluate(
        &self,
        sample: &SentimentSample,
        has_sentiment_result: bool,
        previous: Option<&SentimentSample>,
    ) -> (EscalationRule, Decision) {
        // No previous sample means no swing: the first turn is judged on its
        // own score.
        let delta = previous
            .map(|p| (p.score - sample.score).abs())
            .unwrap_or(0.0);
        let turn = Turn {
            has_result: has_sentiment_result,
            score: sample.score,
            delta,
        };
        let rule = ESCALATION_RULES
            .into_iter()
            .find(|rule| rule.matches(&turn, &self.thresholds))
            .unwrap_or(EscalationRule::Otherwise);
        (rule, rule.outcome())
    }
}
