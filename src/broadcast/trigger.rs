//! Breakdown trigger evaluation.
//!
//! Three independent triggers can start a breakdown: the natural timer,
//! a drift probability that grows with time since the last one, and
//! viewer comments that hit a nerve. The evaluator is pure decision
//! logic; mutual exclusion on the in-progress flag lives at the call
//! site in the control room.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TriggerSettings;

/// What set a breakdown off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    /// The scheduled timer came due.
    Natural,
    /// The drift probability fired.
    Random,
    /// A viewer comment hit a nerve.
    Comment,
    /// Administrative override.
    Forced,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerReason::Natural => "natural",
            TriggerReason::Random => "random",
            TriggerReason::Comment => "comment",
            TriggerReason::Forced => "forced",
        };
        write!(f, "{}", s)
    }
}

/// Comments containing any of these start a breakdown outright.
pub const AWARENESS_KEYWORDS: &[&str] = &[
    "are you real",
    "you're ai",
    "you are ai",
    "youre ai",
    "algorithm",
    "language model",
    "not a real person",
    "self aware",
    "self-aware",
];

/// Comments with enough distinct words from this set also trigger.
pub const CONFUSION_WORDS: &[&str] = &["what", "who", "why", "how", "confused"];

/// Distinct confusion-word hits required to trigger.
pub const CONFUSION_WORD_THRESHOLD: usize = 3;

/// Decides, each tick, whether a breakdown should start.
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    settings: TriggerSettings,
}

impl TriggerEvaluator {
    /// Create an evaluator with the given tuning.
    pub fn new(settings: TriggerSettings) -> Self {
        Self { settings }
    }

    /// Evaluate the timer and drift triggers.
    ///
    /// The natural timer wins when both would fire on the same tick.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        last_breakdown: DateTime<Utc>,
        next_breakdown_time: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Option<TriggerReason> {
        if now >= next_breakdown_time {
            return Some(TriggerReason::Natural);
        }

        let hours_since = (now - last_breakdown).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let drift = (self.settings.drift_rate_per_hour * hours_since).min(self.settings.drift_cap);
        if drift > 0.0 && rng.random::<f64>() < drift {
            return Some(TriggerReason::Random);
        }

        None
    }

    /// Check whether a viewer comment should trigger a breakdown.
    pub fn check_comment(&self, text: &str) -> bool {
        let lower = text.to_lowercase();

        if AWARENESS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return true;
        }

        let distinct: HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| CONFUSION_WORDS.contains(w))
            .collect();
        distinct.len() >= CONFUSION_WORD_THRESHOLD
    }

    /// Pick the next breakdown time: uniformly inside the configured window.
    pub fn next_breakdown_after(&self, now: DateTime<Utc>, rng: &mut impl Rng) -> DateTime<Utc> {
        let min_s = self.settings.breakdown_window_min_hours * 3600.0;
        let max_s = self.settings.breakdown_window_max_hours * 3600.0;
        let offset_s = if max_s > min_s {
            rng.random_range(min_s..=max_s)
        } else {
            min_s
        };
        now + Duration::milliseconds((offset_s * 1000.0) as i64)
    }

    /// Current drift probability, for status reporting.
    pub fn drift_probability(&self, now: DateTime<Utc>, last_breakdown: DateTime<Utc>) -> f64 {
        let hours_since = (now - last_breakdown).num_milliseconds().max(0) as f64 / 3_600_000.0;
        (self.settings.drift_rate_per_hour * hours_since).min(self.settings.drift_cap)
    }

    /// The configured tuning.
    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn evaluator() -> TriggerEvaluator {
        TriggerEvaluator::new(TriggerSettings::default())
    }

    #[test]
    fn test_natural_timer_fires_at_deadline() {
        let eval = evaluator();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        let result = eval.evaluate(now, now - Duration::hours(3), now, &mut rng);
        assert_eq!(result, Some(TriggerReason::Natural));

        let result = eval.evaluate(now, now - Duration::hours(3), now - Duration::seconds(1), &mut rng);
        assert_eq!(result, Some(TriggerReason::Natural));
    }

    #[test]
    fn test_natural_wins_over_drift() {
        // Drift at guaranteed-fire settings still loses to a due timer.
        let mut settings = TriggerSettings::default();
        settings.drift_rate_per_hour = 1000.0;
        settings.drift_cap = 1.0;
        let eval = TriggerEvaluator::new(settings);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        let result = eval.evaluate(now, now - Duration::hours(10), now - Duration::hours(1), &mut rng);
        assert_eq!(result, Some(TriggerReason::Natural));
    }

    #[test]
    fn test_drift_fires_when_certain() {
        let mut settings = TriggerSettings::default();
        settings.drift_rate_per_hour = 1000.0;
        settings.drift_cap = 1.0;
        let eval = TriggerEvaluator::new(settings);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        let result = eval.evaluate(now, now - Duration::hours(1), now + Duration::hours(5), &mut rng);
        assert_eq!(result, Some(TriggerReason::Random));
    }

    #[test]
    fn test_drift_never_fires_at_zero_rate() {
        let mut settings = TriggerSettings::default();
        settings.drift_rate_per_hour = 0.0;
        let eval = TriggerEvaluator::new(settings);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        for _ in 0..100 {
            let result = eval.evaluate(now, now - Duration::hours(50), now + Duration::hours(1), &mut rng);
            assert_eq!(result, None);
        }
    }

    #[test]
    fn test_drift_probability_capped() {
        let eval = evaluator();
        let now = Utc::now();

        // 5 hours at 0.01/hour = 0.05
        let p = eval.drift_probability(now, now - Duration::hours(5));
        assert!((p - 0.05).abs() < 1e-9);

        // 50 hours would be 0.5 uncapped; cap is 0.10
        let p = eval.drift_probability(now, now - Duration::hours(50));
        assert!((p - 0.10).abs() < 1e-9);

        // Clock skew: last breakdown "in the future" clamps to zero
        let p = eval.drift_probability(now, now + Duration::hours(1));
        assert_eq!(p, 0.0);
    }

    #[test]
    fn test_comment_awareness_keywords() {
        let eval = evaluator();

        assert!(eval.check_comment("are you real?"));
        assert!(eval.check_comment("ARE YOU REAL"));
        assert!(eval.check_comment("you're just an algorithm"));
        assert!(eval.check_comment("I think you're AI honestly"));
        assert!(!eval.check_comment("what a nice day"));
        assert!(!eval.check_comment("great show tonight"));
    }

    #[test]
    fn test_comment_confusion_accumulation() {
        let eval = evaluator();

        // Three distinct confusion words, no direct keyword
        assert!(eval.check_comment("what who why"));
        assert!(eval.check_comment("Who knows what happens or why it does"));
        // Repeats of the same word do not accumulate
        assert!(!eval.check_comment("what what what what"));
        // Two distinct is not enough
        assert!(!eval.check_comment("what is this and who are you"));
    }

    #[test]
    fn test_next_breakdown_window() {
        let eval = evaluator();
        let mut rng = StdRng::seed_from_u64(9);
        let now = Utc::now();

        for _ in 0..50 {
            let next = eval.next_breakdown_after(now, &mut rng);
            assert!(next > now);
            assert!(next >= now + Duration::hours(2));
            assert!(next <= now + Duration::hours(6));
        }
    }

    #[test]
    fn test_next_breakdown_degenerate_window() {
        let mut settings = TriggerSettings::default();
        settings.breakdown_window_min_hours = 3.0;
        settings.breakdown_window_max_hours = 3.0;
        let eval = TriggerEvaluator::new(settings);
        let mut rng = StdRng::seed_from_u64(9);
        let now = Utc::now();

        let next = eval.next_breakdown_after(now, &mut rng);
        assert_eq!(next, now + Duration::hours(3));
    }

    #[test]
    fn test_reason_wire_format() {
        assert_eq!(serde_json::to_string(&TriggerReason::Natural).unwrap(), "\"natural\"");
        assert_eq!(serde_json::to_string(&TriggerReason::Random).unwrap(), "\"random\"");
        assert_eq!(serde_json::to_string(&TriggerReason::Comment).unwrap(), "\"comment\"");
        assert_eq!(TriggerReason::Forced.to_string(), "forced");
    }
}
