use crate::pr::ChangedFile;

use super::types::EligibleFile;

/// Select the files worth sending to the review generator.
///
/// A file is eligible when its extension is in `extensions` and it carries
/// a non-empty patch. Listing order is preserved.
pub fn select_eligible<'a>(
    files: &'a [ChangedFile],
    extensions: &[String],
) -> Vec<EligibleFile<'a>> {
    files
        .iter()
        .filter(|file| has_allowed_extension(&file.path, extensions))
        .filter_map(|file| match file.patch.as_deref() {
            Some(patch) if !patch.trim().is_empty() => Some(EligibleFile { file, patch }),
            _ => None,
        })
        .collect()
}

fn has_allowed_extension(path: &str, extensions: &[String]) -> bool {
    match extension(path) {
        Some(ext) => extensions.iter().any(|allowed| allowed == ext),
        None => false,
    }
}

/// Suffix after the last `.` of the final path component. Dotfiles such as
/// `.gitignore` have none.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}
