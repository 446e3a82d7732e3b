use crate::index::ScoredChunk;

pub const ASSISTANT_NAME: &str = "MediChat Pro";

pub const SYSTEM_INSTRUCTIONS: &str = "You are MediChat Pro, an intelligent medical document assistant.
Based on the following medical documents, provide accurate and helpful answers.
If the information is not in the documents, clearly state that.
When answering, take help from the LLM and give a detailed medical explanation.";

/// Join retrieved chunk contents with blank lines, best match first.
pub fn join_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|h| h.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTIONS}\n\nMedical Documents:\n{context}\n\nUser Question: {question}\n\nAnswer:"
    )
}
