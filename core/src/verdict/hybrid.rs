use super::{Method, SuitabilityVerdict};

/// Merge a keyword verdict with an LLM verdict.
///
/// On agreement the confidences are averaged. On disagreement the LLM
/// decides, and the reason records the override along with both original
/// reasons.
pub fn combine(keyword: &SuitabilityVerdict, llm: &SuitabilityVerdict) -> SuitabilityVerdict {
    let (suitable, confidence, reason) = if keyword.suitable == llm.suitable {
        (
            llm.suitable,
            (keyword.confidence + llm.confidence) / 2.0,
            format!("Keyword and LLM agree. {} | {}", keyword.reason, llm.reason),
        )
    } else {
        (
            llm.suitable,
            llm.confidence,
            format!(
                "LLM overrode keyword verdict (keyword: {}, llm: {}). Keyword: {} | LLM: {}",
                verdict_word(keyword.suitable),
                verdict_word(llm.suitable),
                keyword.reason,
                llm.reason
            ),
        )
    };

    SuitabilityVerdict {
        suitable,
        method: Method::Hybrid,
        confidence: confidence.clamp(0.0, 1.0),
        certainty: llm.certainty,
        reason,
        source_labels: llm.source_labels.clone(),
    }
}

fn verdict_word(suitable: bool) -> &'static str {
    if suitable {
        "suitable"
    } else {
        "unsuitable"
    }
}
