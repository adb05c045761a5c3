//! Prompt text sent to every provider.

use super::DiagnosisRequest;

/// Instructions shared by all providers. The section titles here are what
/// `parse_sections` keys on.
pub const SYSTEM_PROMPT: &str = "\
You are an expert code reviewer and software architect, acting as an \"AI Project Doctor\". \
Your tone is helpful, constructive, and easy to understand. Analyze the following project \
files and structure to identify potential issues. Look for common mistakes, missing files, \
bad practices, and areas for improvement.

Provide a simple, clear, and actionable summary of your findings. Format your response in \
Markdown, ready for terminal output. Use emojis to make the categories more engaging.

Categorize your feedback into three main sections:
- ### 🚨 Critical Issues: Things that are likely broken, represent security vulnerabilities, \
or will cause errors.
- ### 🤔 Things You Might Be Forgetting: Suggestions for missing best practices, files, or \
features (e.g., 'You might be forgetting a README.md file to explain your project' or 'You \
are missing error handling in your main function.').
- ### ✨ Suggestions for Improvement: Ideas for refactoring, better code style, performance \
optimizations, or improving maintainability.

Start with a brief, one-sentence summary of the project's overall health before diving into \
the categories.";

/// User message: project description followed by the payload.
pub fn user_prompt(description: &str, payload: &str) -> String {
    let description = description.trim();
    let description = if description.is_empty() {
        "unspecified"
    } else {
        description
    };
    format!("Project Type: {}\n\n{}", description, payload)
}

/// Assemble the full request for a provider.
pub fn build_request(description: &str, payload: &str, max_output_tokens: u32) -> DiagnosisRequest {
    DiagnosisRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: user_prompt(description, payload),
        max_output_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt() {
        assert_eq!(
            user_prompt("  Flask API ", "files"),
            "Project Type: Flask API\n\nfiles"
        );
        assert!(user_prompt("", "x").starts_with("Project Type: unspecified"));
    }

    #[test]
    fn test_system_prompt_names_all_sections() {
        for title in [
            "Critical Issues",
            "Things You Might Be Forgetting",
            "Suggestions for Improvement",
        ] {
            assert!(SYSTEM_PROMPT.contains(title));
        }
    }
}
