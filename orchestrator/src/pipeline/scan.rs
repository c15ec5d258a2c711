//! Stage 0 — Scan: walk the repository, register a FileAnalysis per
//! candidate file, tally `total_files` and `code_lines`.

use std::path::Path;

use walkdir::WalkDir;

use crate::domain::{FileAnalysis, Task};
use crate::error::OrchestratorError;
use crate::store::TaskStore;

/// Extensions skipped as binary/non-source, per the glossary's ignore
/// list. Dotfiles and anything under `.git`/`node_modules`/`target` are
/// skipped regardless of extension.
const IGNORED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "pdf", "zip", "tar", "gz", "lock", "woff", "woff2", "ttf", "so", "dylib",
    "dll", "bin", "exe",
];

const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", ".venv"];

fn is_ignored_path(path: &Path) -> bool {
    if path.components().any(|c| IGNORED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref())) {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => IGNORED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

fn infer_language(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "md" => "markdown",
        _ => return None,
    };
    Some(language.to_string())
}

fn count_code_lines(content: &str) -> u64 {
    content.lines().filter(|line| !line.trim().is_empty()).count() as u64
}

/// Walk `repo_path`, registering one FileAnalysis per non-ignored file
/// and returning (total_files, code_lines). Idempotent: the store's
/// upsert-by-path policy means re-running Scan after a crash just
/// re-registers the same rows.
pub async fn run(store: &TaskStore, task: &Task, repo_path: &Path) -> Result<(u32, u64), OrchestratorError> {
    let mut total_files = 0u32;
    let mut total_lines = 0u64;

    for entry in WalkDir::new(repo_path).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_ignored_path(path) {
            continue;
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(_) => continue, // not valid UTF-8 text; treat as non-source
        };

        let rel_path = path
            .strip_prefix(repo_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let code_lines = count_code_lines(&content);
        let language = infer_language(path);
        let size = content.len() as u64;

        let analysis = FileAnalysis::new(task.id.clone(), rel_path, language, size, code_lines);
        store.append_file_analysis(analysis).await?;

        total_files += 1;
        total_lines += code_lines;
    }

    Ok((total_files, total_lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_known_binary_extensions() {
        assert!(is_ignored_path(Path::new("assets/logo.png")));
        assert!(!is_ignored_path(Path::new("src/main.rs")));
    }

    #[test]
    fn ignores_vendored_directories() {
        assert!(is_ignored_path(Path::new("node_modules/pkg/index.js")));
    }

    #[test]
    fn infers_common_languages() {
        assert_eq!(infer_language(Path::new("a.rs")).as_deref(), Some("rust"));
        assert_eq!(infer_language(Path::new("a.unknown")), None);
    }

    #[test]
    fn counts_only_non_blank_lines() {
        assert_eq!(count_code_lines("a\n\nb\n  \nc"), 3);
    }
}
