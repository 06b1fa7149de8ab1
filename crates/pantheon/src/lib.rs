//! Pantheon: a convention-driven artifact generation engine.
//!
//! A *process* is a directory of declarative files — schema, locator and
//! parser rules, section markers, content and patch templates — that
//! specifies one of three artifact operations (CREATE, RETRIEVE, UPDATE)
//! plus the BUILD meta-operation that scaffolds new process directories.
//! This crate is the engine that discovers those definitions, compiles
//! their Jsonnet configuration, renders their Jinja templates, and reads
//! and writes artifacts inside a sandboxed store.
//!
//! Architecture in one line: [`filesystem::FileSystem`] is the only I/O
//! port, [`workspace::PantheonWorkspace`] is the only component allowed to
//! use it (and to unwrap [`path::PantheonPath`]), and
//! [`engine::ArtifactEngine`] stays purely computational on top of both.

pub mod constants;
pub mod engine;
pub mod error;
pub mod filesystem;
pub mod handler;
pub mod id_counter;
pub mod jsonnet;
pub mod path;
pub mod path_security;
pub mod uri;
pub mod workspace;

pub use engine::{ArtifactEngine, OperationType, TemplateContext};
pub use error::{PantheonError, Result};
pub use filesystem::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use handler::{BuildOutcome, CreateOutcome, ProcessHandler, UpdateOutcome};
pub use id_counter::ArtifactIdCounter;
pub use path::PantheonPath;
pub use uri::{SemanticUri, UriScheme};
pub use workspace::{
    CreatedFileKind, CreatedFileSummary, PantheonWorkspace, ProcessKind, ProjectConfig,
    TempFileCleanup,
};
