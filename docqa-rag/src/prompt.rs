//! Prompt assembly.

use crate::document::SearchResult;

/// The instruction wrapped around retrieved context.
pub const DEFAULT_TEMPLATE: &str = "Answer the question using only the context below.\n\n\
<context>\n{context}\n</context>\n\nQuestion: {input}";

/// Renders a prompt from retrieved chunks and a question.
///
/// `{context}` is replaced with the chunk texts in retrieval order, separated
/// by blank lines; `{input}` with the question.
///
/// ```rust
/// use docqa_rag::prompt::PromptTemplate;
///
/// let prompt = PromptTemplate::new("{context} | {input}").render(&[], "why?");
/// assert_eq!(prompt, " | why?");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn render(&self, results: &[SearchResult], question: &str) -> String {
        let context =
            results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n");
        // Single pass, so placeholders inside chunk text or the question stay literal.
        let mut rendered = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context}") {
                rendered.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{input}") {
                rendered.push_str(question);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);
        rendered
    }
}
