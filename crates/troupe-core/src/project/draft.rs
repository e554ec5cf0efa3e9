use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::validate_project_name;
use crate::error::{TeamError, TeamResult};

/// Project details extracted from free text by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub fn draft_prompt(message: &str) -> String {
    format!(
        "Extract the project name and description from this message:\n\
         {message}\n\n\
         Respond with ONLY a JSON object of the form \
         {{\"name\": \"project_name\", \"description\": \"project_description\"}}. \
         The name may contain letters, digits, spaces, '-', '_' and '.', and must not \
         start with '.'. No markdown fences, no other keys."
    )
}

/// Parse generated text into a draft, rejecting anything that is not exactly
/// the expected object with a usable name.
pub fn parse_project_draft(text: &str) -> TeamResult<ProjectDraft> {
    let json_str = strip_markdown_fences(text);
    debug!("Project draft after fence stripping: {json_str}");

    let draft: ProjectDraft = serde_json::from_str(json_str).map_err(|e| {
        warn!("Project draft did not match the expected shape: {e}");
        TeamError::InvalidOutput(format!("project draft is not valid: {e}"))
    })?;
    validate_project_name(&draft.name).map_err(|_| {
        TeamError::InvalidOutput(format!("project draft has unusable name '{}'", draft.name))
    })?;
    Ok(draft)
}

pub(crate) fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}
