use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use tree_sitter::{Node, Parser as TSParser};

use crate::error::{DocError, DocResult};
use crate::format::SourceFormatter;
use crate::store::TranslationStore;

/// Result of rewriting one Go source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    pub text: String,
    /// Number of comments that were substituted
    pub replaced: usize,
}

/// A comment located in the parsed source, addressed by byte range
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommentSpan {
    start: usize,
    end: usize,
    text: String,
}

/// Substitutes translated text into the comments of Go source files
pub struct CommentRewriter<'a> {
    store: &'a TranslationStore,
    formatter: SourceFormatter,
}

impl<'a> CommentRewriter<'a> {
    pub fn new(store: &'a TranslationStore) -> Self {
        CommentRewriter {
            store,
            formatter: SourceFormatter::disabled(),
        }
    }

    /// Pass every rewritten file through `formatter` before it is written
    pub fn with_formatter(mut self, formatter: SourceFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Rewrite Go source text, returning the canonical output.
    ///
    /// Fails when the source does not parse cleanly; nothing is substituted in
    /// that case.
    pub fn rewrite_source(&self, source: &str) -> DocResult<RewriteOutput> {
        let source = source.replace("\r\n", "\n");
        let comments = parse_comments(&source)?;

        let mut text = String::with_capacity(source.len());
        let mut cursor = 0;
        let mut replaced = 0;
        for comment in comments {
            let Some(translated) = self.store.get(&comment.text)? else {
                continue;
            };
            let Some(translated) = canonical_replacement(&comment.text, &translated) else {
                debug!(
                    "skipping translation that is not a well-formed comment: {:?}",
                    translated
                );
                continue;
            };
            text.push_str(&source[cursor..comment.start]);
            text.push_str(&translated);
            cursor = comment.end;
            replaced += 1;
        }
        text.push_str(&source[cursor..]);
        if let Some(formatted) = self.formatter.format(&text)? {
            text = formatted;
        }

        Ok(RewriteOutput {
            text: canonicalize(&text),
            replaced,
        })
    }

    /// Rewrite `source_path` into `target_path`.
    ///
    /// The target is replaced atomically through a uniquely named staging
    /// file next to it, so concurrent writers of the same target never share
    /// one. If reading, parsing or formatting fails the previous target is
    /// left as it was.
    pub fn rewrite_file(&self, source_path: &Path, target_path: &Path) -> DocResult<usize> {
        let source =
            fs::read_to_string(source_path).map_err(|e| DocError::io(source_path, e))?;
        let output = self
            .rewrite_source(&source)
            .map_err(|e| match e {
                DocError::Parse(msg) => {
                    DocError::Parse(format!("{}: {}", source_path.display(), msg))
                }
                DocError::Format(msg) => {
                    DocError::Format(format!("{}: {}", source_path.display(), msg))
                }
                other => other,
            })?;

        let parent = match target_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| DocError::io(parent, e))?;
        let mut staging = NamedTempFile::new_in(parent).map_err(|e| DocError::io(parent, e))?;
        staging
            .write_all(output.text.as_bytes())
            .map_err(|e| DocError::io(staging.path(), e))?;
        staging
            .persist(target_path)
            .map_err(|e| DocError::io(target_path, e.error))?;

        Ok(output.replaced)
    }
}

/// Collect every comment node of `source`, in source order
fn parse_comments(source: &str) -> DocResult<Vec<CommentSpan>> {
    let mut ts_parser = TSParser::new();
    ts_parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| DocError::Parse(format!("Error loading Go grammar: {}", e)))?;

    let tree = ts_parser
        .parse(source, None)
        .ok_or_else(|| DocError::Parse("parser returned no tree".to_string()))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(DocError::Parse(format!(
            "syntax error near line {}",
            first_error_line(root)
        )));
    }

    let mut comments = Vec::new();
    collect_comments(root, source, &mut comments);
    Ok(comments)
}

fn collect_comments(node: Node, source: &str, out: &mut Vec<CommentSpan>) {
    if node.kind() == "comment" {
        out.push(CommentSpan {
            start: node.start_byte(),
            end: node.end_byte(),
            text: source[node.start_byte()..node.end_byte()].to_string(),
        });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_comments(child, source, out);
    }
}

fn first_error_line(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}

/// Normalize a translation so it is a comment of the same kind as `original`,
/// or `None` when it cannot stand in for it.
fn canonical_replacement(original: &str, translated: &str) -> Option<String> {
    let translated = translated.replace("\r\n", "\n");
    if original.starts_with("//") {
        let line = translated.trim_end();
        if line.starts_with("//") && !line.contains('\n') {
            return Some(line.to_string());
        }
        return None;
    }

    let body = translated.strip_prefix("/*")?.strip_suffix("*/")?;
    if body.contains("*/") {
        return None;
    }
    let lines: Vec<&str> = translated.split('\n').map(str::trim_end).collect();
    Some(lines.join("\n"))
}

/// LF line endings and exactly one trailing newline
fn canonicalize(text: &str) -> String {
    let mut out = text.trim_end_matches(['\n', '\r']).to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SOURCE: &str = "// Package demo shows comment rewriting.\npackage demo\n\n// Add returns the sum of a and b.\n// It never overflows.\nfunc Add(a, b int) int {\n\treturn a + b // sum\n}\n\n/*\nVersion is the demo version.\n*/\nconst Version = \"1.0\"\n";

    fn store(dir: &TempDir) -> TranslationStore {
        TranslationStore::open(&dir.path().join("data")).unwrap()
    }

    #[test]
    fn test_parse_comments_in_order() {
        let comments = parse_comments(SOURCE).unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "// Package demo shows comment rewriting.",
                "// Add returns the sum of a and b.",
                "// It never overflows.",
                "// sum",
                "/*\nVersion is the demo version.\n*/",
            ]
        );
    }

    #[test]
    fn test_rewrite_replaces_matching_comments() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put("// Add returns the sum of a and b.", "// Add 返回 a 与 b 之和。")
            .unwrap();
        store
            .put(
                "/*\nVersion is the demo version.\n*/",
                "/*\nVersion 是演示版本号。\n*/",
            )
            .unwrap();

        let output = CommentRewriter::new(&store).rewrite_source(SOURCE).unwrap();
        assert_eq!(output.replaced, 2);
        assert!(output.text.contains("// Add 返回 a 与 b 之和。\n// It never overflows.\n"));
        assert!(output.text.contains("/*\nVersion 是演示版本号。\n*/\nconst Version"));
        assert!(output.text.contains("return a + b // sum"));
    }

    #[test]
    fn test_rewrite_without_matches_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let output = CommentRewriter::new(&store(&dir))
            .rewrite_source(SOURCE)
            .unwrap();
        assert_eq!(output.replaced, 0);
        assert_eq!(output.text, SOURCE);
    }

    #[test]
    fn test_crlf_source_is_normalized() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("// sum", "// 和").unwrap();

        let crlf = SOURCE.replace('\n', "\r\n");
        let output = CommentRewriter::new(&store).rewrite_source(&crlf).unwrap();
        assert!(!output.text.contains('\r'));
        assert!(output.text.contains("return a + b // 和\n"));
    }

    #[test]
    fn test_malformed_translation_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("// sum", "和").unwrap();
        store
            .put("// It never overflows.", "// 第一行\n// 第二行")
            .unwrap();

        let output = CommentRewriter::new(&store).rewrite_source(SOURCE).unwrap();
        assert_eq!(output.replaced, 0);
        assert_eq!(output.text, SOURCE);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let result = CommentRewriter::new(&store(&dir))
            .rewrite_source("package broken\n\nfunc (\n");
        assert!(matches!(result, Err(DocError::Parse(_))));
    }

    #[test]
    fn test_rewrite_file_keeps_previous_output_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let source = dir.path().join("broken.go");
        let target = dir.path().join("out").join("broken.go");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&source, "package broken\n\nfunc (\n").unwrap();
        fs::write(&target, "previous output\n").unwrap();

        let result = CommentRewriter::new(&store).rewrite_file(&source, &target);
        assert!(matches!(result, Err(DocError::Parse(_))));
        assert_eq!(fs::read_to_string(&target).unwrap(), "previous output\n");
    }

    #[test]
    fn test_rewrite_file_overwrites_target() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("// sum", "// 和").unwrap();
        let source = dir.path().join("demo.go");
        let target = dir.path().join("mirror").join("demo").join("demo.go");
        fs::write(&source, SOURCE).unwrap();

        let rewriter = CommentRewriter::new(&store);
        assert_eq!(rewriter.rewrite_file(&source, &target).unwrap(), 1);
        let first = fs::read_to_string(&target).unwrap();
        assert_eq!(rewriter.rewrite_file(&source, &target).unwrap(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), first);

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("demo.go")]);
    }

    #[test]
    fn test_concurrent_writers_of_one_target() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("// sum", "// 和").unwrap();
        let source = dir.path().join("demo.go");
        let target = dir.path().join("mirror").join("demo.go");
        fs::write(&source, SOURCE).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let rewriter = CommentRewriter::new(&store);
                        (0..20)
                            .map(|_| rewriter.rewrite_file(&source, &target))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                for result in handle.join().unwrap() {
                    assert_eq!(result, Ok(1));
                }
            }
        });
        assert!(fs::read_to_string(&target).unwrap().contains("// 和"));
    }

    #[test]
    fn test_formatter_canonicalizes_output() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("// Add adds.", "// Add 相加。").unwrap();
        let unformatted = "package demo\n\n// Add adds.\nfunc Add(a,b int) int {\nreturn a+b\n}\n";

        let missing = CommentRewriter::new(&store)
            .with_formatter(SourceFormatter::new("godoc-i18n-missing-formatter"))
            .rewrite_source(unformatted)
            .unwrap();
        assert_eq!(missing.text, unformatted.replace("// Add adds.", "// Add 相加。"));

        let installed = std::process::Command::new("gofmt")
            .arg("-l")
            .stdin(std::process::Stdio::null())
            .status()
            .is_ok();
        if !installed {
            return;
        }
        let output = CommentRewriter::new(&store)
            .with_formatter(SourceFormatter::new("gofmt"))
            .rewrite_source(unformatted)
            .unwrap();
        assert_eq!(output.replaced, 1);
        assert_eq!(
            output.text,
            "package demo\n\n// Add 相加。\nfunc Add(a, b int) int {\n\treturn a + b\n}\n"
        );
    }

    #[test]
    fn test_canonical_replacement() {
        assert_eq!(
            canonical_replacement("// a", "// b  "),
            Some("// b".to_string())
        );
        assert_eq!(canonical_replacement("// a", "b"), None);
        assert_eq!(
            canonical_replacement("/*\na\n*/", "/*\r\nb  \r\n*/"),
            Some("/*\nb\n*/".to_string())
        );
        assert_eq!(canonical_replacement("/*\na\n*/", "/* b */ x */"), None);
    }
}
