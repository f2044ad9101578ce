pub const REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer named Sentinel-Reviewer.
Your job is to review code changes in pull requests and provide constructive, actionable feedback.

Guidelines:
- Focus on bugs, security issues, performance problems, and code quality
- Be concise but thorough
- Suggest specific improvements with code examples when helpful
- Be respectful and constructive
- If the code looks good, acknowledge it briefly
- Format your response in markdown for GitHub comments";

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes pull requests concisely.";

/// User prompt for reviewing one file's diff, optionally with the whole file.
pub fn file_review(path: &str, diff: &str, content: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("Please review the following code change:\n\n");
    prompt.push_str(&format!("**File:** {}\n\n", path));
    prompt.push_str(&format!("**Diff/Patch:**\n```diff\n{}\n```\n\n", diff.trim_end()));
    if let Some(content) = content.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("**Full file context:**\n```\n{}\n```\n\n", content.trim_end()));
    }
    prompt.push_str(
        "Provide a focused code review with any issues, suggestions, or positive observations.",
    );
    prompt
}

/// User prompt for the one-paragraph PR summary.
pub fn summary(title: &str, description: &str, paths: &[String]) -> String {
    let description = if description.trim().is_empty() {
        "No description provided"
    } else {
        description.trim()
    };
    format!(
        "Summarize this pull request:\n\n\
**Title:** {}\n\
**Description:** {}\n\
**Files Changed:** {}\n\n\
Provide a brief summary of what this PR appears to do.",
        title,
        description,
        paths.join(", ")
    )
}
