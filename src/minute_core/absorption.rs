//! Absorption: host-supplied signal or an imbalance heuristic

use super::snapshot::AbsorptionSignal;

/// Imbalance above which the heuristic reports absorption.
pub const ABSORPTION_THRESHOLD: f64 = 0.6;

/// Absorption outcome for one minute, resolved exactly once per update.
#[derive(Debug, Clone, PartialEq)]
pub enum Absorption {
    /// Taken verbatim from the host.
    Structured {
        detected: bool,
        strength: f64,
        side: String,
    },
    /// Derived from volume and delta.
    Heuristic {
        detected: bool,
        /// `None` when not detected.
        strength: Option<f64>,
        side: String,
    },
    /// Not evaluated (safe mode) or not enough inputs.
    Unavailable,
}

impl Absorption {
    pub fn detected(&self) -> bool {
        match self {
            Absorption::Structured { detected, .. } | Absorption::Heuristic { detected, .. } => *detected,
            Absorption::Unavailable => false,
        }
    }

    /// Strength, with NaN standing in for "undefined".
    pub fn strength(&self) -> f64 {
        match self {
            Absorption::Structured { strength, .. } => *strength,
            Absorption::Heuristic { strength, .. } => strength.unwrap_or(f64::NAN),
            Absorption::Unavailable => f64::NAN,
        }
    }

    pub fn side(&self) -> &str {
        match self {
            Absorption::Structured { side, .. } | Absorption::Heuristic { side, .. } => side,
            Absorption::Unavailable => "",
        }
    }
}

/// Resolve absorption for one bar.
///
/// A structured signal always wins. Otherwise the heuristic needs a positive
/// total volume and a resolved delta.
pub fn evaluate(signal: Option<&AbsorptionSignal>, volume: f64, delta: Option<f64>) -> Absorption {
    if let Some(signal) = signal {
        return Absorption::Structured {
            detected: signal.detected.unwrap_or(false),
            strength: signal.strength.unwrap_or(f64::NAN),
            side: signal.side.clone().unwrap_or_default(),
        };
    }

    let delta = match delta {
        Some(d) if d.is_finite() => d,
        _ => return Absorption::Unavailable,
    };
    if !volume.is_finite() || volume <= 0.0 {
        return Absorption::Unavailable;
    }

    let imbalance = 1.0 - (delta.abs() / volume.max(1e-9)).min(1.0);
    let detected = imbalance > ABSORPTION_THRESHOLD;
    let side = if delta > 0.0 {
        "buy"
    } else if delta < 0.0 {
        "sell"
    } else {
        ""
    };

    Absorption::Heuristic {
        detected,
        strength: detected.then_some(imbalance),
        side: side.to_string(),
    }
}
