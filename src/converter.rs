use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DocError, DocResult};
use crate::format::SourceFormatter;
use crate::rewriter::CommentRewriter;
use crate::store::TranslationStore;

const SOURCE_EXTENSION: &str = "go";

/// Which source root a mirrored tree is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// The standard library root (GOROOT)
    Primary,
    /// The third-party root (GOPATH)
    Secondary,
}

impl RootKind {
    pub const ALL: [RootKind; 2] = [RootKind::Primary, RootKind::Secondary];

    /// Directory name of this root inside a language's mirrored tree
    pub fn dir_name(&self) -> &'static str {
        match self {
            RootKind::Primary => "root",
            RootKind::Secondary => "path",
        }
    }
}

/// Check that `package` is a slash-separated path that stays below a root.
///
/// Empty, absolute and backslash paths are rejected, as is any `.` or `..`
/// segment.
pub fn validate_package(package: &str) -> DocResult<()> {
    let valid = !package.contains('\\')
        && package
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(DocError::Package(format!("{:?}", package)))
    }
}

/// One source directory to mirror for a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub package: String,
}

impl ConversionJob {
    pub fn source_dir(&self) -> PathBuf {
        self.source_root.join("src").join(&self.package)
    }

    pub fn target_dir(&self) -> PathBuf {
        self.target_root.join("src").join(&self.package)
    }
}

/// Outcome of converting one package
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, DocError)>,
}

impl ConversionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: ConversionReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
    }
}

/// Mirrors Go packages from the two source roots into one language's tree
#[derive(Debug, Clone)]
pub struct PackageConverter {
    primary_root: PathBuf,
    secondary_root: PathBuf,
    /// `<workdir>/<language>`
    language_dir: PathBuf,
    formatter: SourceFormatter,
}

impl PackageConverter {
    pub fn new(primary_root: &Path, secondary_root: &Path, language_dir: &Path) -> Self {
        PackageConverter {
            primary_root: primary_root.to_path_buf(),
            secondary_root: secondary_root.to_path_buf(),
            language_dir: language_dir.to_path_buf(),
            formatter: SourceFormatter::disabled(),
        }
    }

    /// Format every mirrored file with `formatter`
    pub fn with_formatter(mut self, formatter: SourceFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn source_root(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Primary => &self.primary_root,
            RootKind::Secondary => &self.secondary_root,
        }
    }

    /// `<workdir>/<language>/<root-kind>`
    pub fn mirror_root(&self, kind: RootKind) -> PathBuf {
        self.language_dir.join(kind.dir_name())
    }

    /// Jobs for every configured root that actually contains `package`
    pub fn jobs(&self, package: &str) -> DocResult<Vec<ConversionJob>> {
        validate_package(package)?;
        Ok(RootKind::ALL
            .iter()
            .map(|kind| ConversionJob {
                source_root: self.source_root(*kind).to_path_buf(),
                target_root: self.mirror_root(*kind),
                package: package.to_string(),
            })
            .filter(|job| !job.source_root.as_os_str().is_empty() && job.source_dir().is_dir())
            .collect())
    }

    /// Mirror `package` from every root that has it.
    ///
    /// Only an invalid package name is an error; per-file failures are
    /// collected in the report.
    pub fn convert_package(
        &self,
        package: &str,
        store: &TranslationStore,
    ) -> DocResult<ConversionReport> {
        let mut report = ConversionReport::default();
        let jobs = self.jobs(package)?;
        if jobs.is_empty() {
            debug!("package {} not found under any source root", package);
        }
        for job in jobs {
            report.merge(self.run_job(&job, store));
        }
        Ok(report)
    }

    /// Rewrite every Go file below the job's source directory
    pub fn run_job(&self, job: &ConversionJob, store: &TranslationStore) -> ConversionReport {
        let mut report = ConversionReport::default();
        let source_dir = job.source_dir();
        let target_dir = job.target_dir();
        let rewriter = CommentRewriter::new(store).with_formatter(self.formatter.clone());

        for entry in WalkDir::new(&source_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(source_dir.as_path()).to_path_buf();
                    warn!("cannot read {}: {}", path.display(), e);
                    report.failed.push((path, DocError::Io(e.to_string())));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_source_file(entry.path()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&source_dir)
                .unwrap_or(entry.path());
            let target = target_dir.join(relative);
            match rewriter.rewrite_file(entry.path(), &target) {
                Ok(replaced) => {
                    debug!("wrote {} ({} comments translated)", target.display(), replaced);
                    report.written.push(target);
                }
                Err(e) => {
                    warn!("skipping {}: {}", entry.path().display(), e);
                    report.failed.push((entry.path().to_path_buf(), e));
                }
            }
        }
        report
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SOURCE_EXTENSION)
}

/// Copy a directory tree, creating `target` as needed
pub fn copy_dir(source: &Path, target: &Path) -> DocResult<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| DocError::Io(e.to_string()))?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination).map_err(|e| DocError::io(&destination, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &destination)
                .map_err(|e| DocError::io(&destination, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
