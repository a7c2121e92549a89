use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Extensions kept by the default documentation filter (lowercase, no dot).
pub const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "yml", "yaml", "json"];

/// Dependency lockfiles removed regardless of extension.
pub const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "composer.lock",
    "Gemfile.lock",
    "Cargo.lock",
    "Pipfile.lock",
    "poetry.lock",
    "uv.lock",
    "go.sum",
];

/// What a filter pass left behind and what it removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Files kept after filtering.
    pub retained: usize,
    /// Kept files that are markdown (`.md` / `.mdx`).
    pub markdown: usize,
    pub removed_files: usize,
    pub removed_dirs: usize,
}

impl FilterReport {
    /// Parse the single summary line printed by [`DocFilter::shell_script`].
    pub fn parse_shell(stdout: &str) -> Option<Self> {
        let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
        let numbers: Vec<usize> = line
            .split_whitespace()
            .map(|n| n.parse().ok())
            .collect::<Option<_>>()?;

        match numbers.as_slice() {
            [retained, markdown, removed_files, removed_dirs] => Some(Self {
                retained: *retained,
                markdown: *markdown,
                removed_files: *removed_files,
                removed_dirs: *removed_dirs,
            }),
            _ => None,
        }
    }
}

/// Allow-list of documentation files.
///
/// One rule set drives both workspace strategies: [`DocFilter::apply`]
/// walks a local directory, [`DocFilter::shell_script`] renders the same
/// rules as `find` invocations for shell-backed workspaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFilter {
    extensions: Vec<String>,
    excluded_names: Vec<String>,
}

impl Default for DocFilter {
    fn default() -> Self {
        Self {
            extensions: DOC_EXTENSIONS.iter().map(|e| (*e).to_owned()).collect(),
            excluded_names: LOCKFILES.iter().map(|n| (*n).to_owned()).collect(),
        }
    }
}

impl DocFilter {
    pub fn new(extensions: &[&str], excluded_names: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            excluded_names: excluded_names.iter().map(|n| (*n).to_owned()).collect(),
        }
    }

    /// True if a file with this name survives filtering.
    pub fn is_allowed(&self, file_name: &str) -> bool {
        if self.excluded_names.iter().any(|n| n == file_name) {
            return false;
        }

        match extension_of(file_name) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    pub fn is_markdown(file_name: &str) -> bool {
        matches!(extension_of(file_name).as_deref(), Some("md") | Some("mdx"))
    }

    /// Filter `dir` in place.
    ///
    /// Deletes disallowed files and symlinks, then prunes directories left
    /// empty (bottom-up). `dir` itself is never removed. Entries that vanish
    /// mid-walk are treated as already deleted.
    pub fn apply(&self, dir: &Path) -> io::Result<FilterReport> {
        let mut report = FilterReport::default();

        if !dir.is_dir() {
            return Ok(report);
        }

        for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            let file_type = entry.file_type();
            let name = entry.file_name().to_string_lossy();

            if file_type.is_dir() {
                if remove_if_empty(entry.path())? {
                    report.removed_dirs += 1;
                }
            } else if file_type.is_file() && self.is_allowed(&name) {
                report.retained += 1;
                if Self::is_markdown(&name) {
                    report.markdown += 1;
                }
            } else {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => report.removed_files += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(report)
    }

    /// Render the filter as a POSIX shell script operating on `dir`.
    ///
    /// The script prints one line: `<retained> <markdown> <removed_files> <removed_dirs>`.
    pub fn shell_script(&self, dir: &str) -> String {
        let keep = self
            .extensions
            .iter()
            .map(|e| format!("-iname {}", shell_quote(&format!("*.{e}"))))
            .collect::<Vec<_>>()
            .join(" -o ");
        let drop = self
            .excluded_names
            .iter()
            .map(|n| format!("-name {}", shell_quote(n)))
            .collect::<Vec<_>>()
            .join(" -o ");
        let drop_clause = if drop.is_empty() {
            String::new()
        } else {
            format!(" -o {drop}")
        };

        format!(
            "dir={dir}\n\
             if [ ! -d \"$dir\" ]; then echo '0 0 0 0'; exit 0; fi\n\
             rl=$(find \"$dir\" -type l -print -delete | wc -l)\n\
             rf=$(find \"$dir\" -type f \\( ! \\( {keep} \\){drop_clause} \\) -print -delete | wc -l)\n\
             rd=$(find \"$dir\" -mindepth 1 -type d -empty -print -delete | wc -l)\n\
             kept=$(find \"$dir\" -type f | wc -l)\n\
             md=$(find \"$dir\" -type f \\( -iname '*.md' -o -iname '*.mdx' \\) | wc -l)\n\
             echo \"$kept $md $((rl + rf)) $rd\"\n",
            dir = shell_quote(dir),
        )
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    // matches `find -iname '*.ext'`, so `.md` counts as markdown too
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    let mut entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if entries.next().is_some() {
        return Ok(false);
    }

    match std::fs::remove_dir(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Single-quote a string for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn retained_files(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }

    fn sample_tree(root: &Path) {
        write(root, "guide/intro.md", "# Intro");
        write(root, "guide/advanced.MDX", "# Advanced");
        write(root, "guide/logo.png", "png");
        write(root, "config/nav.yml", "nav: []");
        write(root, "config/meta.json", "{}");
        write(root, "package-lock.json", "{}");
        write(root, "src/index.ts", "export {}");
        write(root, "src/deep/nested/util.ts", "export {}");
        write(root, "Cargo.lock", "");
    }

    #[test]
    fn allows_doc_extensions_case_insensitively() {
        let filter = DocFilter::default();
        assert!(filter.is_allowed("README.md"));
        assert!(filter.is_allowed("page.MDX"));
        assert!(filter.is_allowed("nav.yaml"));
        assert!(filter.is_allowed("data.json"));
        assert!(!filter.is_allowed("main.rs"));
        assert!(!filter.is_allowed("Makefile"));
    }

    #[test]
    fn lockfiles_excluded_by_exact_name() {
        let filter = DocFilter::default();
        assert!(!filter.is_allowed("package-lock.json"));
        assert!(!filter.is_allowed("pnpm-lock.yaml"));
        assert!(filter.is_allowed("package.json"));
    }

    #[test]
    fn apply_keeps_docs_and_prunes_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        sample_tree(tmp.path());

        let report = DocFilter::default().apply(tmp.path()).unwrap();

        assert_eq!(
            retained_files(tmp.path()),
            vec![
                "config/meta.json",
                "config/nav.yml",
                "guide/advanced.MDX",
                "guide/intro.md",
            ]
        );
        assert_eq!(report.retained, 4);
        assert_eq!(report.markdown, 2);
        assert_eq!(report.removed_files, 5);
        assert!(!tmp.path().join("src").exists());
        assert_eq!(report.removed_dirs, 3);
    }

    #[test]
    fn apply_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        sample_tree(tmp.path());
        let filter = DocFilter::default();

        let first = filter.apply(tmp.path()).unwrap();
        let after_first = retained_files(tmp.path());
        let second = filter.apply(tmp.path()).unwrap();

        assert_eq!(retained_files(tmp.path()), after_first);
        assert_eq!(second.retained, first.retained);
        assert_eq!(second.removed_files, 0);
        assert_eq!(second.removed_dirs, 0);
    }

    #[test]
    fn apply_never_removes_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("only-code");
        write(&root, "main.rs", "fn main() {}");

        let report = DocFilter::default().apply(&root).unwrap();
        assert_eq!(report.retained, 0);
        assert!(root.is_dir());
    }

    #[test]
    fn apply_on_missing_dir_is_empty_report() {
        let tmp = tempfile::tempdir().unwrap();
        let report = DocFilter::default()
            .apply(&tmp.path().join("missing"))
            .unwrap();
        assert_eq!(report, FilterReport::default());
    }

    #[test]
    fn parse_shell_reads_last_line() {
        let report = FilterReport::parse_shell("noise\n4 2 5 3\n").unwrap();
        assert_eq!(
            report,
            FilterReport {
                retained: 4,
                markdown: 2,
                removed_files: 5,
                removed_dirs: 3,
            }
        );
        assert!(FilterReport::parse_shell("oops").is_none());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    #[cfg(unix)]
    fn shell_script_matches_local_walk() {
        let local = tempfile::tempdir().unwrap();
        let shell = tempfile::tempdir().unwrap();
        sample_tree(local.path());
        sample_tree(shell.path());
        let filter = DocFilter::default();

        let local_report = filter.apply(local.path()).unwrap();

        let script = filter.shell_script(&shell.path().to_string_lossy());
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&script)
            .output()
            .unwrap();
        assert!(output.status.success());
        let shell_report =
            FilterReport::parse_shell(&String::from_utf8_lossy(&output.stdout)).unwrap();

        assert_eq!(retained_files(local.path()), retained_files(shell.path()));
        assert_eq!(local_report, shell_report);
    }
}
