//! Semantic URI parsing: `scheme://process[/sub-path][?k=v&...]`.
//!
//! The scheme set is closed; routing to workspace accessors happens in
//! `workspace::PantheonWorkspace::get_resolved_content`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PantheonError, Result};

/// The closed set of asset schemes templates and schemas may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
    ArtifactContentTemplate,
    ArtifactDirectoryTemplate,
    ArtifactFilenameTemplate,
    ArtifactLocator,
    ArtifactParser,
    ArtifactSectionMarkers,
    ArtifactSections,
    ProcessRoutine,
    ProcessSchema,
    ArtifactTemplate,
}

impl UriScheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "artifact-content-template" => Some(Self::ArtifactContentTemplate),
            "artifact-directory-template" => Some(Self::ArtifactDirectoryTemplate),
            "artifact-filename-template" => Some(Self::ArtifactFilenameTemplate),
            "artifact-locator" => Some(Self::ArtifactLocator),
            "artifact-parser" => Some(Self::ArtifactParser),
            "artifact-section-markers" => Some(Self::ArtifactSectionMarkers),
            "artifact-sections" => Some(Self::ArtifactSections),
            "process-routine" => Some(Self::ProcessRoutine),
            "process-schema" => Some(Self::ProcessSchema),
            "artifact-template" => Some(Self::ArtifactTemplate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtifactContentTemplate => "artifact-content-template",
            Self::ArtifactDirectoryTemplate => "artifact-directory-template",
            Self::ArtifactFilenameTemplate => "artifact-filename-template",
            Self::ArtifactLocator => "artifact-locator",
            Self::ArtifactParser => "artifact-parser",
            Self::ArtifactSectionMarkers => "artifact-section-markers",
            Self::ArtifactSections => "artifact-sections",
            Self::ProcessRoutine => "process-routine",
            Self::ProcessSchema => "process-schema",
            Self::ArtifactTemplate => "artifact-template",
        }
    }
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed semantic URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticUri {
    pub scheme: UriScheme,
    pub process: String,
    pub sub_path: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl SemanticUri {
    /// Parses `scheme://process[/sub-path][?k=v&...]`.
    ///
    /// Query parameters without `=` are recorded with an empty value.
    pub fn parse(uri: &str) -> Result<Self> {
        let Some((scheme_str, rest)) = uri.split_once("://") else {
            return Err(PantheonError::MalformedUri {
                uri: uri.to_owned(),
                message: "missing '://'".into(),
            });
        };

        if scheme_str.is_empty() {
            return Err(PantheonError::MalformedUri {
                uri: uri.to_owned(),
                message: "empty scheme".into(),
            });
        }
        if rest.is_empty() {
            return Err(PantheonError::MalformedUri {
                uri: uri.to_owned(),
                message: "missing process name".into(),
            });
        }

        let scheme = UriScheme::parse(scheme_str)
            .ok_or_else(|| PantheonError::UnsupportedScheme(scheme_str.to_owned()))?;

        let (path_part, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((key, value)) => params.insert(key.to_owned(), value.to_owned()),
                    None => params.insert(pair.to_owned(), String::new()),
                };
            }
        }

        let (process, sub_path) = match path_part.split_once('/') {
            Some((process, sub)) => (process.to_owned(), Some(sub.to_owned())),
            None => (path_part.to_owned(), None),
        };

        if process.is_empty() {
            return Err(PantheonError::MalformedUri {
                uri: uri.to_owned(),
                message: "missing process name".into(),
            });
        }

        Ok(Self {
            scheme,
            process,
            sub_path,
            params,
        })
    }
}

/// True when a template name looks like a semantic URI rather than a file
/// path, which is how the include loader decides where to route it.
pub fn is_semantic_uri(reference: &str) -> bool {
    reference.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_process() {
        let uri = SemanticUri::parse("process-schema://create-ticket").unwrap();
        assert_eq!(uri.scheme, UriScheme::ProcessSchema);
        assert_eq!(uri.process, "create-ticket");
        assert_eq!(uri.sub_path, None);
        assert!(uri.params.is_empty());
    }

    #[test]
    fn parses_sub_path() {
        let uri =
            SemanticUri::parse("artifact-template://update-guide/sections/core-principles")
                .unwrap();
        assert_eq!(uri.scheme, UriScheme::ArtifactTemplate);
        assert_eq!(uri.process, "update-guide");
        assert_eq!(uri.sub_path.as_deref(), Some("sections/core-principles"));
    }

    #[test]
    fn parses_query_parameters() {
        let uri = SemanticUri::parse("artifact-sections://get-ticket?data=sections.plan&flag")
            .unwrap();
        assert_eq!(uri.params.get("data").map(String::as_str), Some("sections.plan"));
        assert_eq!(uri.params.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn rejects_malformed_uris() {
        assert!(matches!(
            SemanticUri::parse("no-separator").unwrap_err(),
            PantheonError::MalformedUri { .. }
        ));
        assert!(matches!(
            SemanticUri::parse("://process").unwrap_err(),
            PantheonError::MalformedUri { .. }
        ));
        assert!(matches!(
            SemanticUri::parse("process-schema://").unwrap_err(),
            PantheonError::MalformedUri { .. }
        ));
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(
            SemanticUri::parse("mystery://thing").unwrap_err(),
            PantheonError::UnsupportedScheme(_)
        ));
    }
}
