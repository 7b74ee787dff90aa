use crate::model::RetrievedPassage;

pub const CONTEXT_MARKER: &str = "Context:";
pub const QUESTION_MARKER: &str = "Question:";

const DOMAIN_PREAMBLE: &str = "You are a medical and public health assistant chatbot. \
Only answer healthcare, disease, treatment, hygiene, radiation safety, or emergency related questions. \
If the question is unrelated, respond with: 'I can only answer healthcare-related questions.' \
Your answer must be accurate, in simple language, and between 100–150 words maximum.\n\n";

const EMERGENCY_INSTRUCTION: &str = "If emergency, say 'If severe symptoms, go to nearest PHC immediately.'";

/// Join retrieved passages into the context block, blank-line separated.
pub fn context_block(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the generation prompt.
///
/// With `restrict_to_domain` the model is also told to stay on health topics
/// and keep the answer short.
pub fn compose(context: &str, question: &str, restrict_to_domain: bool) -> String {
    if restrict_to_domain {
        format!(
            "{DOMAIN_PREAMBLE}{CONTEXT_MARKER} {context}\n\n{QUESTION_MARKER} {question}\n\
             Answer clearly for a rural audience. {EMERGENCY_INSTRUCTION}"
        )
    } else {
        format!(
            "{CONTEXT_MARKER} {context}\n\n{QUESTION_MARKER} {question}\n\
             Answer briefly and clearly for a rural audience in simple language. {EMERGENCY_INSTRUCTION}"
        )
    }
}
