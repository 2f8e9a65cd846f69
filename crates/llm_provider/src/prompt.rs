//! Plain-text prompt rendering for completion-style generators.

use crate::{GenerationError, Message};

/// Label that closes every rendered prompt and marks where the response begins.
pub const ROLE_MARKER: &str = "Assistant:";

/// Renders a conversation into the `Role: content` completion prompt.
///
/// Each turn becomes `"<Label>: <content>\n"`; turns are separated by one
/// more newline and the prompt ends with [`ROLE_MARKER`].
pub fn build_prompt(messages: &[Message]) -> Result<String, GenerationError> {
    let mut parts = Vec::with_capacity(messages.len() + 1);
    for (index, message) in messages.iter().enumerate() {
        let label = message.role.label();
        if label.trim().is_empty() {
            return Err(GenerationError::invalid_message(index, "role name is empty"));
        }
        // argv cannot carry NUL bytes.
        if message.content.contains('\0') || label.contains('\0') {
            return Err(GenerationError::invalid_message(
                index,
                "content contains a NUL byte",
            ));
        }
        parts.push(format!("{label}: {}\n", message.content));
    }
    parts.push(ROLE_MARKER.to_string());
    Ok(parts.join("\n"))
}
