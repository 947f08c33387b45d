//! # State Classification Module
//!
//! Maps HRV statistics to the labels shown to the user.
//!
//! ## Schemes
//! - `StressLevel` from RMSSD + SDNN (three levels)
//! - `AutonomicBalance` from RMSSD + heart rate
//! - `CoachingState`, a two-outcome label from RMSSD alone
//!
//! All three read the same RMSSD value, computed once by the estimator.

use serde::Serialize;

/// SDNN and RMSSD both below this are under the timing resolution of a camera feed
const UNMEASURABLE_VARIABILITY_MS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomicBalance {
    Sympathetic,
    Balanced,
    Parasympathetic,
}

/// Coarse calm/tense label used for coaching copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachingState {
    /// Calm: RMSSD at or above the threshold
    Coach,
    /// Tense: RMSSD below the threshold
    Clash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub stress_level: StressLevel,
    pub autonomic_balance: AutonomicBalance,
    pub coaching_state: CoachingState,
}

pub fn classify_stress(rmssd: f64, sdnn: f64) -> StressLevel {
    if rmssd < UNMEASURABLE_VARIABILITY_MS && sdnn < UNMEASURABLE_VARIABILITY_MS {
        // A metronome-regular rhythm says nothing about stress either way
        return StressLevel::Moderate;
    }
    if rmssd > 50.0 && sdnn > 50.0 {
        StressLevel::Low
    } else if rmssd < 20.0 || sdnn < 30.0 {
        StressLevel::High
    } else {
        StressLevel::Moderate
    }
}

pub fn classify_autonomic_balance(rmssd: f64, heart_rate: u32) -> AutonomicBalance {
    if rmssd > 50.0 && heart_rate < 70 {
        AutonomicBalance::Parasympathetic
    } else if rmssd < 25.0 && heart_rate > 85 {
        AutonomicBalance::Sympathetic
    } else {
        AutonomicBalance::Balanced
    }
}

pub fn classify_coaching_state(rmssd: f64, threshold_ms: f64) -> CoachingState {
    if rmssd >= threshold_ms {
        CoachingState::Coach
    } else {
        CoachingState::Clash
    }
}

/// Run every scheme against one set of statistics
pub fn classify(rmssd: f64, sdnn: f64, heart_rate: u32, coach_threshold_ms: f64) -> Classification {
    Classification {
        stress_level: classify_stress(rmssd, sdnn),
        autonomic_balance: classify_autonomic_balance(rmssd, heart_rate),
        coaching_state: classify_coaching_state(rmssd, coach_threshold_ms),
    }
}

/// User-facing summary of a reading
pub fn feedback_text(classification: &Classification, heart_rate: u32, rmssd: f64) -> String {
    let headline = match classification.coaching_state {
        CoachingState::Coach => format!(
            "Your rhythm is calm and flexible ({} bpm, RMSSD {:.0} ms). \
             You're in a good place to take on today's challenge.",
            heart_rate, rmssd
        ),
        CoachingState::Clash => format!(
            "Your body is running a little tense ({} bpm, RMSSD {:.0} ms). \
             Take three slow breaths, exhaling longer than you inhale, before your next step.",
            heart_rate, rmssd
        ),
    };

    let detail = match (classification.stress_level, classification.autonomic_balance) {
        (StressLevel::Low, AutonomicBalance::Parasympathetic) => {
            "Recovery mode is switched on; keep the momentum going."
        }
        (StressLevel::Low, _) => "Stress looks low right now.",
        (StressLevel::Moderate, AutonomicBalance::Sympathetic) => {
            "You're alert and a bit revved up; a short walk can help settle it."
        }
        (StressLevel::Moderate, _) => "Stress looks moderate, which is normal for a busy day.",
        (StressLevel::High, AutonomicBalance::Sympathetic) => {
            "Fight-or-flight is in charge; pause and loosen your shoulders."
        }
        (StressLevel::High, _) => "Stress looks high; give yourself a few quiet minutes.",
    };

    format!("{} {}", headline, detail)
}
