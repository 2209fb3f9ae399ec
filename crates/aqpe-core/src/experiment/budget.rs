//! Evidence-sample budgets: how many circuit shots each iteration spends.

/// Ceiling applied to auto-computed budgets the caller did not ask for explicitly.
pub const MAX_DEFAULT_EVIDENCE_SAMPLES: u64 = 1_000_000;

/// How the caller asked for the per-iteration evidence budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvidenceRequest {
    /// Not specified: auto-compute, then cap at [`MAX_DEFAULT_EVIDENCE_SAMPLES`].
    #[default]
    Default,
    /// Explicitly zero: auto-compute without the cap.
    Auto,
    /// Explicit shot count.
    Fixed(u64),
}

impl EvidenceRequest {
    /// Maps an optional user value onto a request: `None` is the default, `Some(0)` means auto.
    pub fn from_option(value: Option<u64>) -> Self {
        match value {
            None => EvidenceRequest::Default,
            Some(0) => EvidenceRequest::Auto,
            Some(samples) => EvidenceRequest::Fixed(samples),
        }
    }
}

/// A resolved per-iteration evidence budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceBudget {
    /// Shots taken per iteration; always at least 1.
    pub samples: u64,
    /// Value produced by the auto formula, if it was consulted.
    pub computed: Option<u64>,
    /// True when the auto value was cut down to the default ceiling.
    pub capped: bool,
}

impl EvidenceBudget {
    pub fn resolve(request: EvidenceRequest, precision: f64, alpha: f64) -> Self {
        let (samples, computed, capped) = match request {
            EvidenceRequest::Fixed(samples) => (samples, None, false),
            EvidenceRequest::Auto => {
                let computed = auto_evidence_samples(precision, alpha);
                (computed, Some(computed), false)
            }
            EvidenceRequest::Default => {
                let computed = auto_evidence_samples(precision, alpha);
                let capped = computed > MAX_DEFAULT_EVIDENCE_SAMPLES;
                (computed.min(MAX_DEFAULT_EVIDENCE_SAMPLES), Some(computed), capped)
            }
        };

        Self {
            samples: samples.max(1),
            computed,
            capped,
        }
    }
}

/// Shots per iteration needed to reach `precision` with depth exponent `alpha`.
///
/// `alpha = 1` gives `ceil(4 ln(1/precision))`; otherwise
/// `ceil((2 / (1 - alpha)) (precision^-2(1 - alpha) - 1))`. The result saturates at `u64::MAX`.
pub fn auto_evidence_samples(precision: f64, alpha: f64) -> u64 {
    let value = if alpha == 1.0 {
        (4.0 * (1.0 / precision).ln()).ceil()
    } else {
        let exponent = 2.0 * (1.0 - alpha);
        ((2.0 / (1.0 - alpha)) * (1.0 / precision.powf(exponent) - 1.0)).ceil()
    };
    float_to_count(value)
}

/// Circuit depth the final iterations reach: `ceil(1 / precision^alpha)`.
pub fn required_circuit_depth(precision: f64, alpha: f64) -> u64 {
    float_to_count((1.0 / precision.powf(alpha)).ceil())
}

fn float_to_count(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        // `as` saturates for values beyond u64::MAX.
        value as u64
    }
}
