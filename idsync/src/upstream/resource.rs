//! Upstream resource paths and the identifier each one is signed with.
//!
//! Every upstream path has the shape `{prefix}/{id}[/{view}]`. The signing input
//! is the segment that follows the first known prefix, so the mapping from path to
//! identifier lives here rather than at call sites.

use std::fmt;

/// Government registries a session can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Registry {
    /// Mexican electoral registry
    Ine,
    /// Mexican population registry
    Curp,
}

impl Registry {
    pub fn as_str(self) -> &'static str {
        match self {
            Registry::Ine => "ine",
            Registry::Curp => "curp",
        }
    }
}

/// Closed set of upstream resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Session,
    Attempt,
    Media,
    Address,
    AddressMedia,
    Registry(Registry),
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Session,
        ResourceKind::Attempt,
        ResourceKind::Media,
        ResourceKind::Address,
        ResourceKind::AddressMedia,
        ResourceKind::Registry(Registry::Ine),
        ResourceKind::Registry(Registry::Curp),
    ];

    /// Path segment that introduces this resource's identifier.
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Session => "sessions",
            ResourceKind::Attempt => "attempts",
            ResourceKind::Media => "media",
            ResourceKind::Address => "address",
            ResourceKind::AddressMedia => "address-media",
            ResourceKind::Registry(Registry::Ine) => "ine-registry",
            ResourceKind::Registry(Registry::Curp) => "curp-registry",
        }
    }

    pub fn from_prefix(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == segment)
    }
}

/// Find the resource kind and signing identifier in a relative resource path.
///
/// The first segment matching a known prefix wins; the query string is ignored.
pub fn signing_target(path: &str) -> Option<(ResourceKind, &str)> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if let Some(kind) = ResourceKind::from_prefix(segment) {
            return segments.next().map(|id| (kind, id));
        }
    }
    None
}

/// A concrete upstream resource, relative to `{base_url}/{api_version}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    kind: ResourceKind,
    id: String,
    view: Option<&'static str>,
    version: Option<String>,
}

impl Resource {
    fn new(kind: ResourceKind, id: &str, view: Option<&'static str>) -> Self {
        Self {
            kind,
            id: id.to_string(),
            view,
            version: None,
        }
    }

    pub fn session_decision(session_id: &str) -> Self {
        Self::new(ResourceKind::Session, session_id, Some("decision"))
    }

    pub fn session_person(session_id: &str) -> Self {
        Self::new(ResourceKind::Session, session_id, Some("person"))
    }

    pub fn session_media(session_id: &str) -> Self {
        Self::new(ResourceKind::Session, session_id, Some("media"))
    }

    pub fn session_watchlist(session_id: &str) -> Self {
        Self::new(ResourceKind::Session, session_id, Some("watchlist-screening"))
    }

    pub fn session_attempts(session_id: &str) -> Self {
        Self::new(ResourceKind::Session, session_id, Some("attempts"))
    }

    pub fn registry_check(registry: Registry, session_id: &str, version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            ..Self::new(ResourceKind::Registry(registry), session_id, None)
        }
    }

    pub fn attempt_media(attempt_id: &str) -> Self {
        Self::new(ResourceKind::Attempt, attempt_id, Some("media"))
    }

    pub fn media(media_id: &str) -> Self {
        Self::new(ResourceKind::Media, media_id, None)
    }

    pub fn address_media_list(address_id: &str) -> Self {
        Self::new(ResourceKind::Address, address_id, Some("media"))
    }

    pub fn address_media(media_id: &str) -> Self {
        Self::new(ResourceKind::AddressMedia, media_id, None)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Query-encoded registry version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Path segments, unencoded.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![self.kind.prefix(), self.id.as_str()];
        segments.extend(self.view);
        segments
    }

    pub fn path(&self) -> String {
        self.segments().join("/")
    }

    /// Identifier-free label, safe to use as a metric label.
    pub fn label(&self) -> String {
        match self.view {
            Some(view) => format!("{}/{}", self.kind.prefix(), view),
            None => self.kind.prefix().to_string(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())?;
        if let Some(version) = &self.version {
            write!(f, "?version={version}")?;
        }
        Ok(())
    }
}
