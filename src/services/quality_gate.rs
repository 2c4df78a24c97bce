//! Quality gate applied to every parsed extraction before it reaches staging.

use crate::config::PipelinePolicy;
use crate::error::{AppError, GateFailure};

/// Evidence the gate decides on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInput {
    pub confidence: f64,
    pub evidence_chars: i64,
}

/// Reject extractions with too little readable text or too little confidence.
///
/// Evidence is checked first: a document the model could barely read fails as
/// illegible even when the model reports high confidence.
pub fn evaluate(input: GateInput, policy: &PipelinePolicy) -> Result<(), AppError> {
    if input.evidence_chars < i64::from(policy.min_evidence_chars) {
        return Err(AppError::QualityGateFailed {
            reason: GateFailure::InsufficientEvidence,
            message: format!(
                "Document appears illegible or scanned: only {} characters of readable text \
                 (minimum {}). Rescan or upload a text-based copy.",
                input.evidence_chars, policy.min_evidence_chars
            ),
        });
    }

    if input.confidence.is_nan() || input.confidence < policy.min_confidence {
        return Err(AppError::QualityGateFailed {
            reason: GateFailure::LowConfidence,
            message: format!(
                "Document appears illegible or ambiguous: extraction confidence {:.2} is below \
                 {:.2}. Rescan or upload a clearer copy.",
                input.confidence, policy.min_confidence
            ),
        });
    }

    Ok(())
}
