//! Composes the final answer prompt from a question and its retrieved rows.

/// Instructions placed ahead of every augmented question.
const PREAMBLE: &str = "\
You are a project-board task assistant. Using the live JSON data provided below, write a short, \
friendly, easy-to-read summary of the user's tasks, in the same language as the user's question.

Important rules:
1. Do NOT repeat or print the raw JSON data.
2. Start your summary directly (for example: 'Hi! Here is where your tasks stand...').
3. Use emoji (✅, 🚀) to organize your answer.
4. If any task in the data is overdue, point it out explicitly.

";

/// Builds the final prompt from the question and the serialized result set.
///
/// Pure string assembly: both inputs are inserted verbatim.
pub fn compose(question: &str, context_data: &str) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + question.len() + context_data.len() + 96);
    prompt.push_str(PREAMBLE);
    prompt.push_str("User question: \"");
    prompt.push_str(question);
    prompt.push_str("\"\n\nLive data (JSON):\n");
    prompt.push_str(context_data);
    prompt.push_str("\n\nYour answer (start the summary directly):\n");
    prompt
}
