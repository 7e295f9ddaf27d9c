//! Stuff-strategy prompt assembly.
//!
//! All retrieved chunk texts are concatenated in descending similarity
//! order into a context block, followed by the (possibly history-enhanced)
//! question and a fixed instruction suffix. When the total context would
//! exceed the configured character budget, the lowest-scored chunks are
//! evicted first until it fits.

use crate::store::VectorMatch;

const INSTRUCTION_HEADER: &str = "Use the following pieces of context to answer \
the question at the end. If you don't know the answer, just say that you don't \
know, don't try to make up an answer.";

const INSTRUCTION_SUFFIX: &str = "Helpful Answer:";

/// The assembled prompt plus the matches that actually made it into the
/// context block, so source attribution reflects what the model saw.
#[derive(Debug, Clone)]
pub struct StuffedPrompt {
    pub prompt: String,
    pub included: Vec<VectorMatch>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    pub fn build(&self, matches: &[VectorMatch], question: &str) -> StuffedPrompt {
        let included = self.fit_to_budget(matches);

        let mut context = String::new();
        for m in &included {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&m.chunk.text);
        }

        let prompt = format!(
            "{}\n\n{}\n\nQuestion: {}\n{}",
            INSTRUCTION_HEADER, context, question, INSTRUCTION_SUFFIX
        );

        StuffedPrompt { prompt, included }
    }

    /// Score-ascending eviction: drop the weakest matches until the total
    /// context length fits the budget. Returned in descending score order.
    fn fit_to_budget(&self, matches: &[VectorMatch]) -> Vec<VectorMatch> {
        let mut kept: Vec<VectorMatch> = matches.to_vec();
        kept.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut total: usize = kept.iter().map(|m| m.chunk.text.chars().count()).sum();
        while total > self.max_context_chars {
            match kept.pop() {
                Some(evicted) => total -= evicted.chunk.text.chars().count(),
                None => break,
            }
        }

        kept
    }
}
