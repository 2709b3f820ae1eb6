//! Response analyzer
//!
//! Scans loop responses for completion signals and stuck indicators. Stuck
//! detection is consecutive: any productive iteration resets the counter.
//! Repeating the previous response verbatim counts as a stuck indicator.

use tracing::debug;

/// Default completion sentinel the iteration prompt asks for
pub const DEFAULT_COMPLETION_SIGNAL: &str = "TASK_COMPLETE";

/// Markers that suggest the model is spinning
pub const STUCK_MARKERS: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "cannot proceed",
    "can't proceed",
    "unable to proceed",
    "i don't know how",
    "no progress",
    "same as before",
];

/// Analyzer configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Sentinels that mark completion
    pub completion_signals: Vec<String>,

    /// Minimum confidence for a completion exit
    pub confidence_threshold: f64,

    /// Consecutive stuck iterations before a stuck exit
    pub stuck_threshold: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            completion_signals: vec![DEFAULT_COMPLETION_SIGNAL.to_string()],
            confidence_threshold: 0.7,
            stuck_threshold: 3,
        }
    }
}

/// Verdict for one response
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// A completion signal was present
    pub is_complete: bool,

    /// Completion confidence in [0, 1]
    pub confidence: f64,

    /// Stuck indicators found in this response
    pub stuck_indicators: u32,

    /// Consecutive stuck iterations so far
    pub consecutive_stuck: u32,
}

impl Analysis {
    /// Whether this analysis satisfies the completion exit
    pub fn completes(&self, threshold: f64) -> bool {
        self.is_complete && self.confidence >= threshold
    }
}

/// Stateful analyzer: tracks the previous response and the consecutive
/// stuck counter
#[derive(Debug)]
pub struct ResponseAnalyzer {
    config: AnalyzerConfig,
    last_response: Option<String>,
    consecutive_stuck: u32,
}

impl ResponseAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            last_response: None,
            consecutive_stuck: 0,
        }
    }

    /// Configured stuck threshold
    pub fn stuck_threshold(&self) -> u32 {
        self.config.stuck_threshold
    }

    /// Configured confidence threshold
    pub fn confidence_threshold(&self) -> f64 {
        self.config.confidence_threshold
    }

    /// Analyze one response and update internal state
    pub fn analyze(&mut self, response: &str) -> Analysis {
        let lower = response.to_lowercase();

        // Completion: explicit sentinel, with soft wording as partial signal
        let signal_hit = self
            .config
            .completion_signals
            .iter()
            .any(|s| response.contains(s.as_str()) || lower.contains(&s.to_lowercase()));

        let (is_complete, confidence) = if signal_hit {
            let soft_support = ["complete", "finished", "done"].iter().any(|w| lower.contains(w));
            (true, if soft_support { 0.95 } else { 0.85 })
        } else if lower.contains("task is complete") || lower.contains("all done") {
            (true, 0.6)
        } else {
            (false, completion_fraction(&lower))
        };

        // Stuck: marker scan plus verbatim repetition
        let mut stuck_indicators = STUCK_MARKERS.iter().filter(|m| lower.contains(**m)).count() as u32;
        if self.last_response.as_deref() == Some(response) {
            debug!("analyze: response identical to previous iteration");
            stuck_indicators += 1;
        }

        if stuck_indicators > 0 && !is_complete {
            self.consecutive_stuck += 1;
        } else {
            self.consecutive_stuck = 0;
        }
        self.last_response = Some(response.to_string());

        let analysis = Analysis {
            is_complete,
            confidence,
            stuck_indicators,
            consecutive_stuck: self.consecutive_stuck,
        };
        debug!(?analysis, "analyze: verdict");
        analysis
    }

    /// Whether the consecutive stuck counter has crossed the threshold
    pub fn is_stuck(&self) -> bool {
        self.consecutive_stuck >= self.config.stuck_threshold
    }
}

/// Rough completion fraction for in-progress responses: counts checked-off
/// markers the model tends to emit.
fn completion_fraction(lower: &str) -> f64 {
    let done = lower.matches("[x]").count();
    let open = lower.matches("[ ]").count();
    if done + open == 0 {
        0.0
    } else {
        done as f64 / (done + open) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ResponseAnalyzer {
        ResponseAnalyzer::new(AnalyzerConfig::default())
    }

    #[test]
    fn test_sentinel_completes_with_high_confidence() {
        let mut a = analyzer();
        let analysis = a.analyze("All files summarized. TASK_COMPLETE. Work is done.");

        assert!(analysis.is_complete);
        assert!(analysis.confidence >= 0.9);
        assert!(analysis.completes(0.7));
    }

    #[test]
    fn test_plain_progress_is_not_complete() {
        let mut a = analyzer();
        let analysis = a.analyze("I refactored the parser and will continue with tests.");

        assert!(!analysis.is_complete);
        assert_eq!(analysis.consecutive_stuck, 0);
    }

    #[test]
    fn test_stuck_markers_accumulate_consecutively() {
        let mut a = analyzer();

        a.analyze("I'm not sure how to continue with this part.");
        a.analyze("Still cannot proceed past the build error.");
        let third = a.analyze("I am not sure what to do next.");

        assert_eq!(third.consecutive_stuck, 3);
        assert!(a.is_stuck());
    }

    #[test]
    fn test_productive_iteration_resets_stuck() {
        let mut a = analyzer();

        a.analyze("I'm not sure about this.");
        a.analyze("Found it - fixed the import and moving on.");
        let third = a.analyze("cannot proceed");

        assert_eq!(third.consecutive_stuck, 1);
        assert!(!a.is_stuck());
    }

    #[test]
    fn test_identical_response_counts_as_stuck() {
        let mut a = analyzer();

        let first = a.analyze("Working on step two of the plan.");
        assert_eq!(first.stuck_indicators, 0);

        let repeat = a.analyze("Working on step two of the plan.");
        assert_eq!(repeat.stuck_indicators, 1);
        assert_eq!(repeat.consecutive_stuck, 1);
    }

    #[test]
    fn test_checkbox_completion_fraction() {
        let mut a = analyzer();
        let analysis = a.analyze("- [x] parse\n- [x] execute\n- [ ] verify\n- [ ] document");

        assert!(!analysis.is_complete);
        assert!((analysis.confidence - 0.5).abs() < 1e-9);
    }
}
