use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::converter::{ConversionReport, PackageConverter, RootKind, copy_dir};
use crate::corpus::{CorpusParser, load_corpus_file};
use crate::error::{DocError, DocResult};
use crate::format::SourceFormatter;
use crate::store::TranslationStore;

/// Everything one language needs: its store and its converter
#[derive(Clone)]
pub struct Language {
    pub code: String,
    pub store: TranslationStore,
    pub converter: PackageConverter,
}

impl Language {
    /// `<workdir>/<code>/<root-kind>`
    pub fn mirror_root(&self, kind: RootKind) -> PathBuf {
        self.converter.mirror_root(kind)
    }
}

/// Ordered registry of configured languages.
///
/// Conversions for the same (language, package) pair are serialized so two
/// triggers never write the same target files at once.
pub struct LanguageRegistry {
    languages: Vec<Language>,
    conversion_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LanguageRegistry {
    /// Prepare directories and open the store of every configured language.
    ///
    /// A store that cannot be opened is fatal.
    pub fn open(config: &Config) -> DocResult<Self> {
        let mut languages = Vec::with_capacity(config.languages.len());
        let formatter = SourceFormatter::new(&config.format_program);
        for code in &config.languages {
            info!("init language {}", code);
            let language_dir = config.language_dir(code);
            for kind in RootKind::ALL {
                let src = language_dir.join(kind.dir_name()).join("src");
                fs::create_dir_all(&src).map_err(|e| DocError::io(&src, e))?;
            }
            seed_doc_tree(&config.primary_root, &language_dir);

            let store = TranslationStore::open(&language_dir.join("data"))?;
            languages.push(Language {
                code: code.clone(),
                store,
                converter: PackageConverter::new(
                    &config.primary_root,
                    &config.secondary_root,
                    &language_dir,
                )
                .with_formatter(formatter.clone()),
            });
        }
        Ok(LanguageRegistry {
            languages,
            conversion_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|language| language.code == code)
    }

    /// Languages in configuration order
    pub fn languages(&self) -> impl Iterator<Item = &Language> {
        self.languages.iter()
    }

    /// Parse a corpus file into the language's store.
    /// Returns the number of entries written, or `None` for unknown languages.
    pub fn ingest_file(&self, code: &str, path: &Path) -> DocResult<Option<usize>> {
        let Some(language) = self.get(code) else {
            debug!("no language {} registered, ignoring {}", code, path.display());
            return Ok(None);
        };
        info!("input data file {} {}", code, path.display());
        let entries = load_corpus_file(path)?;
        language.store.put_entries(&entries).map(Some)
    }

    /// Same as [`ingest_file`](Self::ingest_file) for corpus text already in memory
    pub fn ingest_text(&self, code: &str, text: &str) -> DocResult<Option<usize>> {
        let Some(language) = self.get(code) else {
            return Ok(None);
        };
        let entries = CorpusParser::new(text).parse();
        language.store.put_entries(&entries).map(Some)
    }

    /// Mirror `package` for one language, holding that pair's conversion lock.
    /// Returns `None` for unknown languages.
    pub fn convert_package(
        &self,
        code: &str,
        package: &str,
    ) -> DocResult<Option<ConversionReport>> {
        let Some(language) = self.get(code) else {
            return Ok(None);
        };
        let lock = self.conversion_lock(code, package);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        info!("convert package {} {}", code, package);
        let report = language.converter.convert_package(package, &language.store)?;
        if !report.is_clean() {
            warn!(
                "package {} {}: {} files failed, {} written",
                code,
                package,
                report.failed.len(),
                report.written.len()
            );
        }
        Ok(Some(report))
    }

    fn conversion_lock(&self, code: &str, package: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .conversion_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((code.to_string(), package.to_string()))
            .or_default()
            .clone()
    }
}

/// Give a language its own copy of the primary root's `doc` directory
fn seed_doc_tree(primary_root: &Path, language_dir: &Path) {
    let source = primary_root.join("doc");
    let target = language_dir.join(RootKind::Primary.dir_name()).join("doc");
    if primary_root.as_os_str().is_empty() || target.exists() || !source.is_dir() {
        return;
    }
    match copy_dir(&source, &target) {
        Ok(count) => info!("copied {} doc files into {}", count, target.display()),
        Err(e) => warn!("failed to copy doc tree into {}: {}", target.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, languages: &[&str]) -> Config {
        Config {
            primary_root: dir.path().join("goroot"),
            secondary_root: dir.path().join("gopath"),
            workdir: dir.path().join("work"),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("goroot/doc")).unwrap();
        fs::write(dir.path().join("goroot/doc/go_spec.html"), "spec").unwrap();

        let registry = LanguageRegistry::open(&config(&dir, &["cn", "jp"])).unwrap();
        let codes: Vec<&str> = registry.languages().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["cn", "jp"]);

        for code in ["cn", "jp"] {
            let base = dir.path().join("work").join(code);
            assert!(base.join("root/src").is_dir());
            assert!(base.join("path/src").is_dir());
            assert!(base.join("data").exists());
            assert!(base.join("root/doc/go_spec.html").is_file());
        }
        assert_eq!(
            registry.get("jp").unwrap().mirror_root(RootKind::Secondary),
            dir.path().join("work/jp/path")
        );
        assert!(registry.get("de").is_none());
    }

    #[test]
    fn test_existing_doc_tree_is_kept() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("goroot/doc")).unwrap();
        fs::write(dir.path().join("goroot/doc/a.html"), "new").unwrap();
        fs::create_dir_all(dir.path().join("work/cn/root/doc")).unwrap();
        fs::write(dir.path().join("work/cn/root/doc/a.html"), "translated").unwrap();

        LanguageRegistry::open(&config(&dir, &["cn"])).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("work/cn/root/doc/a.html")).unwrap(),
            "translated"
        );
    }

    #[test]
    fn test_store_open_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("work/cn")).unwrap();
        // A plain file where the store directory should be
        fs::write(dir.path().join("work/cn/data"), "not a database").unwrap();

        let result = LanguageRegistry::open(&config(&dir, &["cn"]));
        assert!(matches!(result, Err(DocError::Store(_))));
    }

    #[test]
    fn test_unknown_language_is_ignored() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::open(&config(&dir, &["cn"])).unwrap();
        assert_eq!(registry.ingest_text("de", "// a\r\n\r\n// b\r\n").unwrap(), None);
        assert!(registry.convert_package("de", "fmt").unwrap().is_none());
    }

    #[test]
    fn test_invalid_package_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::open(&config(&dir, &["cn"])).unwrap();
        assert!(matches!(
            registry.convert_package("cn", "../../.."),
            Err(DocError::Package(_))
        ));
    }

    #[test]
    fn test_ingest_text() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::open(&config(&dir, &["cn"])).unwrap();
        let written = registry
            .ingest_text("cn", "// Println prints.\r\n\r\n// Println 打印。\r\n")
            .unwrap();
        assert_eq!(written, Some(1));
        assert_eq!(
            registry.get("cn").unwrap().store.get("// Println prints.").unwrap(),
            Some("// Println 打印。".to_string())
        );
    }

    #[test]
    fn test_same_key_shares_lock() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::open(&config(&dir, &["cn"])).unwrap();
        let a = registry.conversion_lock("cn", "fmt");
        let b = registry.conversion_lock("cn", "fmt");
        let c = registry.conversion_lock("cn", "os");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
