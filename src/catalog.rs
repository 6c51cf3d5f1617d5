//! OASIS XML Catalog engine
//!
//! Implements the subset of XML Catalogs 1.1 that the CLI surface exposes:
//! public/system/uri entries with rewrite and suffix variants, name-based
//! doctype/entity/notation entries, document entries, nextCatalog chaining,
//! and group prefer inheritance. Delegate entries are not supported.
//!
//! Catalog files are loaded leniently by default: malformed entries are
//! logged and skipped. Strict loading (the `--validate` option) turns any
//! malformed entry into a hard error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use url::Url;

use crate::error::{CatalogError, CatalogResult};

const CATALOG_NS: &str = "urn:oasis:names:tc:entity:xmlns:xml:catalog";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Whether public or system identifiers win when both could match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefer {
    #[default]
    Public,
    System,
}

impl Prefer {
    fn from_attr(value: &str) -> Option<Prefer> {
        match value {
            "public" => Some(Prefer::Public),
            "system" => Some(Prefer::System),
            _ => None,
        }
    }
}

/// A single catalog entry
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Public {
        public_id: String,
        uri: Url,
        prefer: Prefer,
    },
    System {
        system_id: String,
        uri: Url,
    },
    RewriteSystem {
        start: String,
        prefix: String,
    },
    SystemSuffix {
        suffix: String,
        uri: Url,
    },
    Uri {
        name: String,
        uri: Url,
        nature: Option<String>,
        purpose: Option<String>,
    },
    RewriteUri {
        start: String,
        prefix: String,
    },
    UriSuffix {
        suffix: String,
        uri: Url,
    },
    Doctype {
        name: String,
        uri: Url,
    },
    Document {
        uri: Url,
    },
    Entity {
        name: String,
        uri: Url,
    },
    Notation {
        name: String,
        uri: Url,
    },
    NextCatalog {
        catalog: Url,
    },
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Public { public_id, uri, .. } => {
                write!(f, "public publicId=\"{}\" uri=\"{}\"", public_id, uri)
            }
            Entry::System { system_id, uri } => {
                write!(f, "system systemId=\"{}\" uri=\"{}\"", system_id, uri)
            }
            Entry::RewriteSystem { start, prefix } => write!(
                f,
                "rewriteSystem systemIdStartString=\"{}\" rewritePrefix=\"{}\"",
                start, prefix
            ),
            Entry::SystemSuffix { suffix, uri } => write!(
                f,
                "systemSuffix systemIdSuffix=\"{}\" uri=\"{}\"",
                suffix, uri
            ),
            Entry::Uri {
                name,
                uri,
                nature,
                purpose,
            } => {
                write!(f, "uri name=\"{}\" uri=\"{}\"", name, uri)?;
                if let Some(nature) = nature {
                    write!(f, " nature=\"{}\"", nature)?;
                }
                if let Some(purpose) = purpose {
                    write!(f, " purpose=\"{}\"", purpose)?;
                }
                Ok(())
            }
            Entry::RewriteUri { start, prefix } => write!(
                f,
                "rewriteURI uriStartString=\"{}\" rewritePrefix=\"{}\"",
                start, prefix
            ),
            Entry::UriSuffix { suffix, uri } => {
                write!(f, "uriSuffix uriSuffix=\"{}\" uri=\"{}\"", suffix, uri)
            }
            Entry::Doctype { name, uri } => {
                write!(f, "doctype name=\"{}\" uri=\"{}\"", name, uri)
            }
            Entry::Document { uri } => write!(f, "document uri=\"{}\"", uri),
            Entry::Entity { name, uri } => write!(f, "entity name=\"{}\" uri=\"{}\"", name, uri),
            Entry::Notation { name, uri } => {
                write!(f, "notation name=\"{}\" uri=\"{}\"", name, uri)
            }
            Entry::NextCatalog { catalog } => write!(f, "nextCatalog catalog=\"{}\"", catalog),
        }
    }
}

/// A loaded catalog file
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    uri: Url,
    entries: Vec<Entry>,
}

impl Catalog {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn match_system(&self, system_id: &str) -> Option<Url> {
        for entry in &self.entries {
            if let Entry::System {
                system_id: candidate,
                uri,
            } = entry
            {
                if candidate == system_id {
                    return Some(uri.clone());
                }
            }
        }
        // Longest rewrite prefix wins
        let mut best: Option<(&str, &str)> = None;
        for entry in &self.entries {
            if let Entry::RewriteSystem { start, prefix } = entry {
                if system_id.starts_with(start.as_str())
                    && best.map_or(true, |(s, _)| start.len() > s.len())
                {
                    best = Some((start, prefix));
                }
            }
        }
        if let Some((start, prefix)) = best {
            let rewritten = format!("{}{}", prefix, &system_id[start.len()..]);
            if let Ok(uri) = Url::parse(&rewritten) {
                return Some(uri);
            }
        }
        // Longest suffix wins
        let mut best: Option<(&str, &Url)> = None;
        for entry in &self.entries {
            if let Entry::SystemSuffix { suffix, uri } = entry {
                if system_id.ends_with(suffix.as_str())
                    && best.map_or(true, |(s, _)| suffix.len() > s.len())
                {
                    best = Some((suffix, uri));
                }
            }
        }
        best.map(|(_, uri)| uri.clone())
    }

    /// Public entries apply only when the entry prefers public or the query
    /// carried no system identifier at all.
    fn match_public(&self, public_id: &str, have_system: bool) -> Option<Url> {
        for entry in &self.entries {
            if let Entry::Public {
                public_id: candidate,
                uri,
                prefer,
            } = entry
            {
                if candidate == public_id && (*prefer == Prefer::Public || !have_system) {
                    return Some(uri.clone());
                }
            }
        }
        None
    }

    fn match_uri(&self, name: &str, nature: Option<&str>, purpose: Option<&str>) -> Option<Url> {
        for entry in &self.entries {
            if let Entry::Uri {
                name: candidate,
                uri,
                nature: entry_nature,
                purpose: entry_purpose,
            } = entry
            {
                let nature_ok = match (nature, entry_nature) {
                    (Some(want), Some(have)) => want == have,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                let purpose_ok = match (purpose, entry_purpose) {
                    (Some(want), Some(have)) => want == have,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                if candidate == name && nature_ok && purpose_ok {
                    return Some(uri.clone());
                }
            }
        }
        if nature.is_some() || purpose.is_some() {
            return None;
        }
        let mut best: Option<(&str, &str)> = None;
        for entry in &self.entries {
            if let Entry::RewriteUri { start, prefix } = entry {
                if name.starts_with(start.as_str())
                    && best.map_or(true, |(s, _)| start.len() > s.len())
                {
                    best = Some((start, prefix));
                }
            }
        }
        if let Some((start, prefix)) = best {
            let rewritten = format!("{}{}", prefix, &name[start.len()..]);
            if let Ok(uri) = Url::parse(&rewritten) {
                return Some(uri);
            }
        }
        let mut best: Option<(&str, &Url)> = None;
        for entry in &self.entries {
            if let Entry::UriSuffix { suffix, uri } = entry {
                if name.ends_with(suffix.as_str())
                    && best.map_or(true, |(s, _)| suffix.len() > s.len())
                {
                    best = Some((suffix, uri));
                }
            }
        }
        best.map(|(_, uri)| uri.clone())
    }

    fn match_doctype(&self, name: &str) -> Option<Url> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Doctype {
                name: candidate,
                uri,
            } if candidate == name => Some(uri.clone()),
            _ => None,
        })
    }

    fn match_entity(&self, name: &str) -> Option<Url> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Entity {
                name: candidate,
                uri,
            } if candidate == name => Some(uri.clone()),
            _ => None,
        })
    }

    fn match_notation(&self, name: &str) -> Option<Url> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Notation {
                name: candidate,
                uri,
            } if candidate == name => Some(uri.clone()),
            _ => None,
        })
    }

    fn match_document(&self) -> Option<Url> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Document { uri } => Some(uri.clone()),
            _ => None,
        })
    }

    fn next_catalogs(&self) -> Vec<Url> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::NextCatalog { catalog } => Some(catalog.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Collapse internal whitespace in a public identifier before comparison
pub fn normalize_public_id(public_id: &str) -> String {
    public_id.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unwrap an RFC 3151 `urn:publicid:` URN into the public identifier it
/// encodes. Returns None for anything else.
pub fn unwrap_urn_publicid(urn: &str) -> Option<String> {
    let rest = urn.strip_prefix("urn:publicid:")?;
    let mut out = String::with_capacity(rest.len());
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            ':' => out.push_str("//"),
            ';' => out.push_str("::"),
            '%' => {
                let hi = chars.next()?;
                let lo = chars.next()?;
                let byte = u8::from_str_radix(&format!("{}{}", hi, lo), 16).ok()?;
                out.push(byte as char);
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Turn a command-line locator (path or URI) into an absolute URL,
/// resolving relative paths against the current directory.
pub fn to_absolute_url(locator: &str) -> CatalogResult<Url> {
    if let Ok(url) = Url::parse(locator) {
        return Ok(url);
    }
    let cwd = std::env::current_dir().map_err(|source| CatalogError::Io {
        uri: locator.to_string(),
        source,
    })?;
    let base = Url::from_directory_path(&cwd).map_err(|_| CatalogError::InvalidLocator {
        locator: locator.to_string(),
    })?;
    base.join(locator).map_err(|_| CatalogError::InvalidLocator {
        locator: locator.to_string(),
    })
}

/// Load and parse a catalog file
pub fn load_catalog(url: &Url, strict: bool, default_prefer: Prefer) -> CatalogResult<Catalog> {
    if url.scheme() != "file" {
        return Err(CatalogError::UnsupportedScheme {
            uri: url.to_string(),
        });
    }
    let path = url
        .to_file_path()
        .map_err(|_| CatalogError::UnsupportedScheme {
            uri: url.to_string(),
        })?;
    let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        uri: url.to_string(),
        source,
    })?;
    parse_catalog(url, &text, strict, default_prefer)
}

/// Parse catalog text; `base` is the catalog's own URI
pub fn parse_catalog(
    base: &Url,
    text: &str,
    strict: bool,
    default_prefer: Prefer,
) -> CatalogResult<Catalog> {
    let doc = roxmltree::Document::parse(text).map_err(|e| CatalogError::Malformed {
        uri: base.to_string(),
        details: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "catalog" {
        return Err(CatalogError::NotACatalog {
            uri: base.to_string(),
        });
    }
    let prefer = root
        .attribute("prefer")
        .and_then(Prefer::from_attr)
        .unwrap_or(default_prefer);

    let mut entries = Vec::new();
    collect_entries(base, root, base.clone(), prefer, strict, &mut entries)?;
    debug!(catalog = %base, entries = entries.len(), "loaded catalog");
    Ok(Catalog {
        uri: base.clone(),
        entries,
    })
}

fn collect_entries(
    catalog_uri: &Url,
    node: roxmltree::Node<'_, '_>,
    base: Url,
    prefer: Prefer,
    strict: bool,
    out: &mut Vec<Entry>,
) -> CatalogResult<()> {
    for child in node.children().filter(|c| c.is_element()) {
        let base = match child.attribute((XML_NS, "base")) {
            Some(b) => match base.join(b) {
                Ok(joined) => joined,
                Err(_) => {
                    if strict {
                        return Err(invalid(catalog_uri, format!("bad xml:base: {}", b)));
                    }
                    warn!(catalog = %catalog_uri, base = b, "skipping unresolvable xml:base");
                    base.clone()
                }
            },
            None => base.clone(),
        };

        let name = child.tag_name().name();
        let result = match name {
            "group" => {
                let group_prefer = child
                    .attribute("prefer")
                    .and_then(Prefer::from_attr)
                    .unwrap_or(prefer);
                collect_entries(catalog_uri, child, base, group_prefer, strict, out)?;
                Ok(None)
            }
            "public" => entry2(catalog_uri, &child, &base, "publicId", "uri", |id, uri| {
                Entry::Public {
                    public_id: normalize_public_id(id),
                    uri,
                    prefer,
                }
            }),
            "system" => entry2(catalog_uri, &child, &base, "systemId", "uri", |id, uri| {
                Entry::System {
                    system_id: id.to_string(),
                    uri,
                }
            }),
            "rewriteSystem" => rewrite_entry(
                catalog_uri,
                &child,
                &base,
                "systemIdStartString",
                |start, prefix| Entry::RewriteSystem { start, prefix },
            ),
            "systemSuffix" => entry2(
                catalog_uri,
                &child,
                &base,
                "systemIdSuffix",
                "uri",
                |suffix, uri| Entry::SystemSuffix {
                    suffix: suffix.to_string(),
                    uri,
                },
            ),
            "uri" => entry2(catalog_uri, &child, &base, "name", "uri", |name, uri| {
                Entry::Uri {
                    name: name.to_string(),
                    uri,
                    nature: child.attribute("nature").map(str::to_string),
                    purpose: child.attribute("purpose").map(str::to_string),
                }
            }),
            "rewriteURI" => rewrite_entry(
                catalog_uri,
                &child,
                &base,
                "uriStartString",
                |start, prefix| Entry::RewriteUri { start, prefix },
            ),
            "uriSuffix" => entry2(
                catalog_uri,
                &child,
                &base,
                "uriSuffix",
                "uri",
                |suffix, uri| Entry::UriSuffix {
                    suffix: suffix.to_string(),
                    uri,
                },
            ),
            "doctype" => entry2(catalog_uri, &child, &base, "name", "uri", |name, uri| {
                Entry::Doctype {
                    name: name.to_string(),
                    uri,
                }
            }),
            "document" => match resolve_attr(catalog_uri, &child, &base, "uri") {
                Ok(uri) => Ok(Some(Entry::Document { uri })),
                Err(e) => Err(e),
            },
            "entity" => entry2(catalog_uri, &child, &base, "name", "uri", |name, uri| {
                Entry::Entity {
                    name: name.to_string(),
                    uri,
                }
            }),
            "notation" => entry2(catalog_uri, &child, &base, "name", "uri", |name, uri| {
                Entry::Notation {
                    name: name.to_string(),
                    uri,
                }
            }),
            "nextCatalog" => match resolve_attr(catalog_uri, &child, &base, "catalog") {
                Ok(catalog) => Ok(Some(Entry::NextCatalog { catalog })),
                Err(e) => Err(e),
            },
            "delegatePublic" | "delegateSystem" | "delegateURI" => {
                if strict {
                    return Err(invalid(
                        catalog_uri,
                        format!("{} entries are not supported", name),
                    ));
                }
                warn!(catalog = %catalog_uri, entry = name, "skipping unsupported delegate entry");
                Ok(None)
            }
            _ => {
                let in_catalog_ns = child.tag_name().namespace() == Some(CATALOG_NS);
                if strict && in_catalog_ns {
                    return Err(invalid(
                        catalog_uri,
                        format!("unknown catalog element: {}", name),
                    ));
                }
                Ok(None)
            }
        };

        match result {
            Ok(Some(entry)) => out.push(entry),
            Ok(None) => {}
            Err(e) => {
                if strict {
                    return Err(e);
                }
                warn!(catalog = %catalog_uri, error = %e, "skipping malformed catalog entry");
            }
        }
    }
    Ok(())
}

fn invalid(catalog_uri: &Url, details: String) -> CatalogError {
    CatalogError::InvalidEntry {
        uri: catalog_uri.to_string(),
        details,
    }
}

fn require_attr<'a>(
    catalog_uri: &Url,
    node: &roxmltree::Node<'a, '_>,
    attr: &str,
) -> CatalogResult<&'a str> {
    node.attribute(attr).ok_or_else(|| {
        invalid(
            catalog_uri,
            format!("{} entry missing {}", node.tag_name().name(), attr),
        )
    })
}

fn resolve_attr(
    catalog_uri: &Url,
    node: &roxmltree::Node<'_, '_>,
    base: &Url,
    attr: &str,
) -> CatalogResult<Url> {
    let value = require_attr(catalog_uri, node, attr)?;
    base.join(value)
        .map_err(|_| invalid(catalog_uri, format!("unresolvable {}: {}", attr, value)))
}

fn entry2(
    catalog_uri: &Url,
    node: &roxmltree::Node<'_, '_>,
    base: &Url,
    key_attr: &str,
    uri_attr: &str,
    build: impl FnOnce(&str, Url) -> Entry,
) -> CatalogResult<Option<Entry>> {
    let key = require_attr(catalog_uri, node, key_attr)?;
    let uri = resolve_attr(catalog_uri, node, base, uri_attr)?;
    Ok(Some(build(key, uri)))
}

fn rewrite_entry(
    catalog_uri: &Url,
    node: &roxmltree::Node<'_, '_>,
    base: &Url,
    start_attr: &str,
    build: impl FnOnce(String, String) -> Entry,
) -> CatalogResult<Option<Entry>> {
    let start = require_attr(catalog_uri, node, start_attr)?;
    let prefix = require_attr(catalog_uri, node, "rewritePrefix")?;
    let resolved = base
        .join(prefix)
        .map_err(|_| invalid(catalog_uri, format!("unresolvable rewritePrefix: {}", prefix)))?;
    Ok(Some(build(start.to_string(), resolved.to_string())))
}

/// Loads catalogs on demand, memoizes them for the life of the process, and
/// answers the lookup queries the CLI exposes. The configured catalog list
/// is searched in order; nextCatalog entries chain depth-first behind the
/// catalog that named them.
pub struct CatalogManager {
    catalogs: Vec<Url>,
    strict: bool,
    prefer: Prefer,
    loaded: RwLock<HashMap<Url, Arc<Catalog>>>,
}

impl CatalogManager {
    pub fn new(catalogs: Vec<Url>, strict: bool, prefer: Prefer) -> Self {
        Self {
            catalogs,
            strict,
            prefer,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// The configured catalog files, in search order
    pub fn catalogs(&self) -> &[Url] {
        &self.catalogs
    }

    /// Load a catalog, parsing each file at most once per process
    pub fn load(&self, url: &Url) -> CatalogResult<Arc<Catalog>> {
        if let Some(catalog) = self
            .loaded
            .read()
            .expect("catalog cache lock poisoned")
            .get(url)
        {
            return Ok(catalog.clone());
        }
        let catalog = Arc::new(load_catalog(url, self.strict, self.prefer)?);
        self.loaded
            .write()
            .expect("catalog cache lock poisoned")
            .insert(url.clone(), catalog.clone());
        Ok(catalog)
    }

    /// Load every configured catalog and the nextCatalog chains behind
    /// them. In strict mode this surfaces malformed catalogs up front,
    /// before any resolution happens inside a parser callback that cannot
    /// report them.
    pub fn preload(&self) -> CatalogResult<()> {
        self.search(|_| None::<()>)?;
        Ok(())
    }

    fn search<T>(&self, mut matcher: impl FnMut(&Catalog) -> Option<T>) -> CatalogResult<Option<T>> {
        let mut queue: VecDeque<Url> = self.catalogs.iter().cloned().collect();
        let mut seen: HashSet<Url> = HashSet::new();
        while let Some(url) = queue.pop_front() {
            if !seen.insert(url.clone()) {
                continue;
            }
            let catalog = match self.load(&url) {
                Ok(catalog) => catalog,
                Err(e) => {
                    if self.strict {
                        return Err(e);
                    }
                    warn!(catalog = %url, error = %e, "skipping unloadable catalog");
                    continue;
                }
            };
            if let Some(hit) = matcher(&catalog) {
                return Ok(Some(hit));
            }
            for next in catalog.next_catalogs().into_iter().rev() {
                queue.push_front(next);
            }
        }
        Ok(None)
    }

    pub fn lookup_system(&self, system_id: &str) -> CatalogResult<Option<Url>> {
        if let Some(public_id) = unwrap_urn_publicid(system_id) {
            let normalized = normalize_public_id(&public_id);
            return self.search(|c| c.match_public(&normalized, false));
        }
        self.search(|c| c.match_system(system_id))
    }

    pub fn lookup_public(
        &self,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) -> CatalogResult<Option<Url>> {
        // A publicid URN in the system slot is really a public identifier
        let (system_id, public_id) = match system_id.map(unwrap_urn_publicid) {
            Some(Some(unwrapped)) => (None, Some(unwrapped)),
            _ => (system_id, public_id.map(str::to_string)),
        };

        if let Some(system_id) = system_id {
            if let Some(hit) = self.search(|c| c.match_system(system_id))? {
                return Ok(Some(hit));
            }
        }
        if let Some(public_id) = public_id {
            let normalized = match unwrap_urn_publicid(&public_id) {
                Some(unwrapped) => normalize_public_id(&unwrapped),
                None => normalize_public_id(&public_id),
            };
            let have_system = system_id.is_some();
            return self.search(|c| c.match_public(&normalized, have_system));
        }
        Ok(None)
    }

    pub fn lookup_uri(&self, name: &str) -> CatalogResult<Option<Url>> {
        self.search(|c| c.match_uri(name, None, None))
    }

    pub fn lookup_namespace(
        &self,
        name: &str,
        nature: Option<&str>,
        purpose: Option<&str>,
    ) -> CatalogResult<Option<Url>> {
        if let Some(hit) = self.search(|c| c.match_uri(name, nature, purpose))? {
            return Ok(Some(hit));
        }
        // Nothing qualified matched; an unqualified uri entry still applies
        if nature.is_some() || purpose.is_some() {
            return self.search(|c| c.match_uri(name, None, None));
        }
        Ok(None)
    }

    pub fn lookup_entity(
        &self,
        name: Option<&str>,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) -> CatalogResult<Option<Url>> {
        if system_id.is_some() || public_id.is_some() {
            if let Some(hit) = self.lookup_public(system_id, public_id)? {
                return Ok(Some(hit));
            }
        }
        if let Some(name) = name {
            return self.search(|c| c.match_entity(name));
        }
        Ok(None)
    }

    pub fn lookup_doctype(
        &self,
        name: Option<&str>,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) -> CatalogResult<Option<Url>> {
        if system_id.is_some() || public_id.is_some() {
            if let Some(hit) = self.lookup_public(system_id, public_id)? {
                return Ok(Some(hit));
            }
        }
        if let Some(name) = name {
            return self.search(|c| c.match_doctype(name));
        }
        Ok(None)
    }

    pub fn lookup_notation(
        &self,
        name: Option<&str>,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) -> CatalogResult<Option<Url>> {
        if system_id.is_some() || public_id.is_some() {
            if let Some(hit) = self.lookup_public(system_id, public_id)? {
                return Ok(Some(hit));
            }
        }
        if let Some(name) = name {
            return self.search(|c| c.match_notation(name));
        }
        Ok(None)
    }

    pub fn lookup_document(&self) -> CatalogResult<Option<Url>> {
        self.search(|c| c.match_document())
    }
}
