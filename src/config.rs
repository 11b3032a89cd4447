//! Runtime configuration
//!
//! Built once at startup from an optional JSON file and command-line flags,
//! then passed by reference to the registry, scheduler and web server.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use icu_locale::Locale;
use serde::Deserialize;

use crate::error::{DocError, DocResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Standard library root (GOROOT)
    pub primary_root: PathBuf,
    /// Third-party root (GOPATH)
    pub secondary_root: PathBuf,
    /// Where stores and mirrored trees live
    pub workdir: PathBuf,
    /// Language codes, in registration order
    pub languages: Vec<String>,
    /// Directories holding corpus files
    pub corpus_dirs: Vec<PathBuf>,
    /// Listen address for the web server
    pub addr: String,
    pub pull_interval_secs: u64,
    /// Program invoked as `<program> pull` inside repository mirrors
    pub pull_program: String,
    /// Formatter every mirrored file is piped through; empty disables it
    pub format_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            primary_root: PathBuf::new(),
            secondary_root: PathBuf::new(),
            workdir: PathBuf::from("/tmp/godoc"),
            languages: vec!["cn".to_string()],
            corpus_dirs: Vec::new(),
            addr: "127.0.0.1:8080".to_string(),
            pull_interval_secs: 60,
            pull_program: "git".to_string(),
            format_program: "gofmt".to_string(),
        }
    }
}

impl Config {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    /// `<workdir>/<language>`
    pub fn language_dir(&self, language: &str) -> PathBuf {
        self.workdir.join(language)
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> DocResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DocError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DocError::Config(format!("Failed to parse '{}': {}", path.display(), e))
        })
    }

    /// Command-line flags shared by every binary
    pub fn command(name: &'static str) -> Command {
        Command::new(name)
            .version(env!("CARGO_PKG_VERSION"))
            .arg(
                Arg::new("config")
                    .long("config")
                    .short('c')
                    .help("JSON configuration file; flags override its values"),
            )
            .arg(
                Arg::new("goroot")
                    .long("goroot")
                    .help("Standard library source root"),
            )
            .arg(
                Arg::new("gopath")
                    .long("gopath")
                    .help("Third-party source root"),
            )
            .arg(
                Arg::new("workdir")
                    .long("workdir")
                    .help("Directory for translation stores and mirrored trees"),
            )
            .arg(
                Arg::new("lang")
                    .long("lang")
                    .short('l')
                    .help("Language code to maintain (repeatable, default: cn)")
                    .action(ArgAction::Append),
            )
            .arg(
                Arg::new("data")
                    .long("data")
                    .short('d')
                    .help("Corpus directory to ingest and watch (repeatable)")
                    .action(ArgAction::Append),
            )
            .arg(
                Arg::new("addr")
                    .long("addr")
                    .help("Listen address for the web server"),
            )
            .arg(
                Arg::new("pull-interval")
                    .long("pull-interval")
                    .help("Seconds between upstream pulls of corpus repositories")
                    .value_parser(clap::value_parser!(u64)),
            )
            .arg(
                Arg::new("gofmt")
                    .long("gofmt")
                    .help("Formatter for mirrored sources (default: gofmt, empty to disable)"),
            )
    }

    /// Build a validated configuration from parsed flags
    pub fn from_matches(matches: &ArgMatches) -> DocResult<Self> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Config::from_file(Path::new(path))?,
            None => Config::default(),
        };

        if let Some(goroot) = matches.get_one::<String>("goroot") {
            config.primary_root = PathBuf::from(goroot);
        }
        if let Some(gopath) = matches.get_one::<String>("gopath") {
            config.secondary_root = PathBuf::from(gopath);
        }
        if let Some(workdir) = matches.get_one::<String>("workdir") {
            config.workdir = PathBuf::from(workdir);
        }
        if let Some(langs) = matches.get_many::<String>("lang") {
            config.languages = langs.cloned().collect();
        }
        if let Some(dirs) = matches.get_many::<String>("data") {
            config.corpus_dirs = dirs.map(PathBuf::from).collect();
        }
        if let Some(addr) = matches.get_one::<String>("addr") {
            config.addr = addr.clone();
        }
        if let Some(secs) = matches.get_one::<u64>("pull-interval") {
            config.pull_interval_secs = *secs;
        }
        if let Some(program) = matches.get_one::<String>("gofmt") {
            config.format_program = program.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the registry cannot work with
    pub fn validate(&self) -> DocResult<()> {
        if self.languages.is_empty() {
            return Err(DocError::Config("at least one language is required".to_string()));
        }
        let mut seen = HashSet::new();
        for language in &self.languages {
            validate_language(language)?;
            if !seen.insert(language.as_str()) {
                return Err(DocError::Config(format!("duplicate language '{}'", language)));
            }
        }
        if self.pull_interval_secs == 0 {
            return Err(DocError::Config("pull interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Language codes become directory names, so they must be plain locale codes
fn validate_language(language: &str) -> DocResult<()> {
    if language.is_empty() || language.contains(['.', '/', '\\']) {
        return Err(DocError::Config(format!("invalid language code '{}'", language)));
    }
    language.parse::<Locale>().map_err(|e| {
        DocError::Config(format!("invalid language code '{}': {}", language, e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> DocResult<Config> {
        let matches = Config::command("test")
            .try_get_matches_from(std::iter::once("test").chain(args.iter().copied()))
            .unwrap();
        Config::from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.workdir, PathBuf::from("/tmp/godoc"));
        assert_eq!(config.languages, vec!["cn"]);
        assert_eq!(config.pull_interval(), Duration::from_secs(60));
        assert!(config.corpus_dirs.is_empty());
        assert_eq!(config.format_program, "gofmt");
    }

    #[test]
    fn test_repeatable_flags() {
        let config = parse(&[
            "--goroot=/usr/local/go",
            "--gopath",
            "/home/go",
            "--lang=cn",
            "--lang=jp",
            "--data=/srv/corpus-a",
            "--data=/srv/corpus-b",
            "--addr=:9090",
            "--gofmt=",
        ])
        .unwrap();
        assert_eq!(config.primary_root, PathBuf::from("/usr/local/go"));
        assert_eq!(config.secondary_root, PathBuf::from("/home/go"));
        assert_eq!(config.languages, vec!["cn", "jp"]);
        assert_eq!(
            config.corpus_dirs,
            vec![PathBuf::from("/srv/corpus-a"), PathBuf::from("/srv/corpus-b")]
        );
        assert_eq!(config.addr, ":9090");
        assert_eq!(config.format_program, "");
        assert_eq!(config.language_dir("jp"), PathBuf::from("/tmp/godoc/jp"));
    }

    #[test]
    fn test_file_then_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("godoc.json");
        fs::write(
            &path,
            r#"{"primary_root": "/opt/go", "languages": ["de"], "pull_interval_secs": 300}"#,
        )
        .unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--lang=fr"]).unwrap();
        assert_eq!(config.primary_root, PathBuf::from("/opt/go"));
        assert_eq!(config.languages, vec!["fr"]);
        assert_eq!(config.pull_interval_secs, 300);
        assert_eq!(config.pull_program, "git");
    }

    #[test]
    fn test_invalid_languages() {
        assert!(matches!(parse(&["--lang=../etc"]), Err(DocError::Config(_))));
        assert!(matches!(parse(&["--lang=cn", "--lang=cn"]), Err(DocError::Config(_))));
        assert!(matches!(parse(&["--lang=a.b"]), Err(DocError::Config(_))));
    }

    #[test]
    fn test_zero_pull_interval_rejected() {
        assert!(matches!(
            parse(&["--pull-interval=0"]),
            Err(DocError::Config(_))
        ));
    }
}
