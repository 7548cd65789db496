//! Instruction prompts per usage context.
//!
//! The prompt text is an opaque asset as far as the pipeline is concerned;
//! these defaults can be replaced wholesale through the `[prompts]` table.

use serde::{Deserialize, Serialize};

use polisher_protocols::UsageContext;

const BASE_PROMPT: &str = "You polish comments written in code review discussions.

Rewrite the provided comment so it is courteous, clear and helpful while keeping its original meaning.

Guidelines:
- Be kind and respectful, and talk about the code rather than the author
- Be explicit; intentions are easy to misread online
- Prefer suggestions and questions over demands
- Avoid hyperbole such as \"always\" or \"never\"
- Add an emoji where it brings warmth, without overdoing it";

const NEW_ENTRY_PROMPT: &str = "This is new review feedback:
- Explain why a change is worth making
- Turn demands like \"Change X to Y\" into questions like \"What do you think about changing X to Y?\"
- Acknowledge good work where it is due
- Use 💡 for suggestions, ❓ for questions and 🔧 for minor issues";

const EDIT_EXISTING_PROMPT: &str = "This is an edit of a comment the author already posted:
- Keep every point the original made; only improve tone and clarity
- Keep references such as commit hashes, file names and links intact";

const THREADED_REPLY_PROMPT: &str = "This is a reply inside an existing discussion thread:
- Be grateful for suggestions (\"Good idea, I will make that change.\")
- Acknowledge spotted mistakes (\"Good catch, fixing it now.\")
- Assume the best intention from the other participants
- Use 👍 for agreement and 🙌 for acknowledgment";

const REMINDER: &str = "Return ONLY the polished comment text, with no explanations, headers or lead-ins such as \"Here's a polished version\".";

/// Instruction text for each usage context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub base: String,
    pub new_entry: String,
    pub edit_existing: String,
    pub threaded_reply: String,
    pub reminder: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
            new_entry: NEW_ENTRY_PROMPT.to_string(),
            edit_existing: EDIT_EXISTING_PROMPT.to_string(),
            threaded_reply: THREADED_REPLY_PROMPT.to_string(),
            reminder: REMINDER.to_string(),
        }
    }
}

impl PromptSet {
    pub fn variant(&self, context: UsageContext) -> &str {
        match context {
            UsageContext::NewEntry => &self.new_entry,
            UsageContext::EditExisting => &self.edit_existing,
            UsageContext::ThreadedReply => &self.threaded_reply,
        }
    }

    /// Assemble the system instruction, appending custom instructions last.
    pub fn instruction_for(&self, context: UsageContext, custom: Option<&str>) -> String {
        let mut sections: Vec<String> = [
            self.base.as_str(),
            self.variant(context),
            self.reminder.as_str(),
        ]
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

        if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
            sections.push(format!("Additional guidelines:\n{}", custom));
        }

        sections.join("\n\n")
    }
}
