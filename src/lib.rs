//! Translated mirrors of Go documentation comments.
//!
//! A bilingual corpus maps original comment text to its translation. The
//! mapping is stored per language, and Go source trees are copied into a
//! per-language mirror with every matching comment replaced:
//!
//! ```ignore
//! use std::sync::Arc;
//! use godoc_i18n::{Config, IngestionScheduler, LanguageRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         primary_root: "/usr/local/go".into(),
//!         corpus_dirs: vec!["/srv/godoc-corpus".into()],
//!         ..Config::default()
//!     };
//!     let registry = Arc::new(LanguageRegistry::open(&config)?);
//!     let handle = IngestionScheduler::new(registry, &config).spawn();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod corpus;
pub mod error;
pub mod format;
pub mod mirror;
pub mod registry;
pub mod rewriter;
pub mod scheduler;
pub mod store;


pub use config::Config;
pub use converter::{
    ConversionJob, ConversionReport, PackageConverter, RootKind, validate_package,
};
pub use corpus::{CorpusBlock, CorpusName, CorpusParser, TranslationEntry, load_corpus_file};
pub use error::{DocError, DocResult};
pub use format::SourceFormatter;
pub use mirror::{GitPuller, MirrorExit, RepositoryMirror, RepositoryPuller};
pub use registry::{Language, LanguageRegistry};
pub use rewriter::{CommentRewriter, RewriteOutput};
pub use scheduler::{IngestionScheduler, SchedulerHandle, WatchEvent, WatchExit, WatchOp};
pub use store::TranslationStore;
