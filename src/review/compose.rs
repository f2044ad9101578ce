use async_trait::async_trait;
use colored::Colorize;

use super::types::{ComposedComment, FileReviewOutcome, FileReviewResult, PrSummary};
use super::{CollaboratorError, CommentPublisher};
use crate::pr::PullRequestRef;

const BANNER: &str = "## 🤖 Sentinel-Reviewer Analysis";
const SEPARATOR: &str = "\n\n---\n\n";
const FOOTER: &str = "<sub>🔍 Powered by Sentinel-Reviewer</sub>";

/// Render the summary and per-file results into the comment body.
///
/// Layout:
///
/// ## 🤖 Sentinel-Reviewer Analysis
/// ### 📋 Summary
/// ---
/// ### 📝 File Reviews
/// ### 📄 `path` (one per result, separated by ---)
/// ---
/// footer
pub fn compose(summary: &PrSummary, results: &[FileReviewResult]) -> ComposedComment {
    let mut md = String::new();
    md.push_str(BANNER);
    md.push_str("\n\n");
    md.push_str(&format!("### 📋 Summary\n\n{}", summary.0.trim()));
    md.push_str(SEPARATOR);
    md.push_str("### 📝 File Reviews\n\n");

    let sections: Vec<String> = results.iter().map(file_section).collect();
    md.push_str(&sections.join(SEPARATOR));

    md.push_str(SEPARATOR);
    md.push_str(FOOTER);
    ComposedComment::new(md)
}

fn file_section(result: &FileReviewResult) -> String {
    let body = match &result.outcome {
        FileReviewOutcome::Reviewed(text) => text.trim().to_string(),
        FileReviewOutcome::Unavailable(reason) => {
            format!("> ⚠️ **Review unavailable:** {}", single_line(reason))
        }
    };
    format!("### 📄 `{}`\n\n{}", result.path, body)
}

// Keeps multi-line error chains inside the quote block.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Print a composed comment to the terminal instead of publishing it.
pub fn print_preview(pr: &str, body: &str) {
    println!();
    println!("{}", format!("═══ Review preview for {} ═══", pr).cyan().bold());
    println!();
    println!("{}", body);
    println!();
}

/// Publisher for dry runs: prints the comment and posts nothing.
#[derive(Debug, Default)]
pub struct PreviewPublisher;

#[async_trait]
impl CommentPublisher for PreviewPublisher {
    async fn publish_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<(), CollaboratorError> {
        print_preview(&pr.to_string(), body);
        Ok(())
    }
}
