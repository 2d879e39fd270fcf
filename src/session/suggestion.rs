use crate::generation::TaskId;

/// Reply the suggestion engine gives when it has nothing worth saying
const NO_SUGGESTION: &str = "NO_SUGGESTION";

/// How many earlier suggestions are sent back to avoid repeats
pub const SUGGESTION_MEMORY: usize = 10;

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_')
        .to_ascii_uppercase()
        .replace(' ', "_")
}

/// Whether a complete suggestion reply means "no suggestion"
pub fn is_no_suggestion(text: &str) -> bool {
    let normalized = normalize(text);
    normalized.is_empty() || normalized == NO_SUGGESTION
}

fn could_become_sentinel(text: &str) -> bool {
    let normalized = normalize(text);
    NO_SUGGESTION.starts_with(&normalized) || normalized == NO_SUGGESTION
}

/// Streams a suggestion's chunks, holding them back while the text so far
/// could still turn out to be the no-suggestion sentinel.
#[derive(Debug)]
pub struct SuggestionStream {
    pub id: TaskId,
    held: String,
    released: bool,
}

impl SuggestionStream {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            held: String::new(),
            released: false,
        }
    }

    /// Text that may be shown now, if any
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        if self.released {
            return Some(chunk.to_string());
        }

        self.held.push_str(chunk);
        if could_become_sentinel(&self.held) {
            return None;
        }

        self.released = true;
        Some(std::mem::take(&mut self.held))
    }

    /// Held-back text still owed to the client once the reply is complete
    pub fn finish(&mut self, full_text: &str) -> Option<String> {
        if self.released || is_no_suggestion(full_text) {
            return None;
        }
        let held = std::mem::take(&mut self.held);
        (!held.trim().is_empty()).then_some(held)
    }
}
