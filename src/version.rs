//! Version descriptor of the running service

use serde::Serialize;

use crate::config::Identity;
use crate::Error;

/// A component shipped inside a version bundle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Component {
    /// Component name
    pub name: String,
    /// Component version
    pub version: String,
}

/// A changelog entry of a version bundle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Changelog {
    /// Component the change applies to
    pub component: String,
    /// What changed
    pub description: String,
    /// Change kind (added, changed, fixed, removed)
    pub kind: String,
}

/// A named, versioned set of components
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionBundle {
    /// Bundle name
    pub name: String,
    /// Bundle version
    pub version: String,
    /// Changelog of this bundle version
    pub changelogs: Vec<Changelog>,
    /// Components in the bundle
    pub components: Vec<Component>,
}

/// Bundle describing this project
pub fn project_bundle(identity: &Identity) -> VersionBundle {
    VersionBundle {
        name: identity.project_name.clone(),
        version: identity.version.clone(),
        changelogs: vec![Changelog {
            component: identity.project_name.clone(),
            description: "Collect cluster inventory, credential and status metrics.".to_string(),
            kind: "changed".to_string(),
        }],
        components: Vec::new(),
    }
}

/// Identity plus version bundles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    identity: Identity,
    bundles: Vec<VersionBundle>,
}

/// Serialised view of [`VersionInfo`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct VersionResponse {
    /// Project description
    pub description: String,
    /// Commit hash
    pub git_commit: String,
    /// Project name
    pub name: String,
    /// Target OS and architecture
    pub os_arch: String,
    /// Source repository
    pub source: String,
    /// Project version
    pub version: String,
    /// Version bundles
    pub version_bundles: Vec<VersionBundle>,
}

impl VersionInfo {
    /// Create a descriptor; identity fields must be non-empty and one bundle given
    pub fn new(identity: Identity, bundles: Vec<VersionBundle>) -> Result<Self, Error> {
        identity.validate()?;
        if bundles.is_empty() {
            return Err(Error::invalid_field(
                "version_bundles",
                "version_bundles must not be empty",
            ));
        }
        Ok(Self { identity, bundles })
    }

    /// Identity this descriptor was built from
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Version bundles
    pub fn bundles(&self) -> &[VersionBundle] {
        &self.bundles
    }

    /// Render the response served to clients
    pub fn response(&self) -> VersionResponse {
        VersionResponse {
            description: self.identity.description.clone(),
            git_commit: self.identity.git_commit.clone(),
            name: self.identity.project_name.clone(),
            os_arch: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            source: self.identity.source.clone(),
            version: self.identity.version.clone(),
            version_bundles: self.bundles.clone(),
        }
    }
}
