//! Catalog-backed resource resolution
//!
//! `Resolver` turns public/system identifiers and URIs into local files:
//! the catalog chain maps the request to a URI, and the resource cache
//! materializes that URI on disk when it is remote. `ChattyResolver`
//! wraps it and narrates every attempt on stdout, which is the main
//! point of this tool.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::cache::ResourceCache;
use crate::catalog::CatalogManager;
use crate::error::Result;
use crate::libxml2::EntityResolver;
use crate::output::Output;

/// A successfully resolved resource
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    /// The URI the catalog mapped the request to
    pub uri: Url,
    /// The local file that actually supplies the bytes
    pub local_path: PathBuf,
}

pub struct Resolver {
    catalogs: CatalogManager,
    cache: Arc<ResourceCache>,
}

impl Resolver {
    pub fn new(catalogs: CatalogManager, cache: Arc<ResourceCache>) -> Self {
        Self { catalogs, cache }
    }

    pub fn catalogs(&self) -> &CatalogManager {
        &self.catalogs
    }

    /// Resolve an external entity by its identifiers. A relative system
    /// identifier is made absolute against `base` before lookup.
    pub fn resolve_entity_ids(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base: Option<&Url>,
    ) -> Result<Option<ResolvedResource>> {
        let absolute_system = match (system_id, base) {
            (Some(system), Some(base)) => Some(
                base.join(system)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| system.to_string()),
            ),
            (Some(system), None) => Some(system.to_string()),
            (None, _) => None,
        };

        match self
            .catalogs
            .lookup_public(absolute_system.as_deref(), public_id)?
        {
            Some(uri) => Ok(Some(self.materialize(uri)?)),
            None => Ok(None),
        }
    }

    /// Resolve a URI reference (stylesheets, schema locations, includes)
    pub fn resolve_uri(&self, href: &str, base: Option<&Url>) -> Result<Option<ResolvedResource>> {
        let absolute = match base {
            Some(base) => base
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        };

        match self.catalogs.lookup_uri(&absolute)? {
            Some(uri) => Ok(Some(self.materialize(uri)?)),
            None => Ok(None),
        }
    }

    /// Resolve the external subset for a document type by name
    pub fn resolve_doctype(&self, name: &str) -> Result<Option<ResolvedResource>> {
        match self.catalogs.lookup_doctype(Some(name), None, None)? {
            Some(uri) => Ok(Some(self.materialize(uri)?)),
            None => Ok(None),
        }
    }

    /// Resolve a schema-style resource request: identifiers first, then
    /// the namespace as a nature-qualified uri lookup.
    pub fn resolve_resource(
        &self,
        namespace: Option<&str>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        nature: Option<&str>,
        base: Option<&Url>,
    ) -> Result<Option<ResolvedResource>> {
        if public_id.is_some() || system_id.is_some() {
            if let Some(hit) = self.resolve_entity_ids(public_id, system_id, base)? {
                return Ok(Some(hit));
            }
        }
        if let Some(namespace) = namespace {
            if let Some(uri) = self.catalogs.lookup_namespace(namespace, nature, None)? {
                return Ok(Some(self.materialize(uri)?));
            }
        }
        Ok(None)
    }

    fn materialize(&self, uri: Url) -> Result<ResolvedResource> {
        let local_path = self.cache.ensure_local_blocking(&uri)?;
        Ok(ResolvedResource { uri, local_path })
    }
}

/// A very chatty resolver.
///
/// Wraps the real resolver and prints a line for every resolution
/// attempt: a check or a cross, what was asked for, what the catalog
/// said, and where the bytes really came from. Without a wrapped
/// resolver every attempt is narrated as a miss.
pub struct ChattyResolver {
    inner: Option<Resolver>,
    output: Arc<Output>,
}

impl ChattyResolver {
    pub fn new(inner: Option<Resolver>, output: Arc<Output>) -> Self {
        Self { inner, output }
    }

    /// Resolve an external entity, narrating the result. Misses for
    /// local system identifiers are not reported; local files that were
    /// never in any catalog would flood the output during a parse.
    pub fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedResource>> {
        let resolved = match &self.inner {
            Some(inner) => inner.resolve_entity_ids(public_id, system_id, None)?,
            None => None,
        };

        let display = match (system_id, public_id) {
            (Some(system), Some(public)) => format!("{} ({})", system, public),
            (Some(system), None) => system.to_string(),
            (None, Some(public)) => public.to_string(),
            (None, None) => return Ok(resolved),
        };

        match &resolved {
            Some(resource) => {
                self.output.resolved(
                    &display,
                    resource.uri.as_str(),
                    Some(&resource.local_path.display().to_string()),
                );
            }
            None => {
                let is_local = system_id.is_some_and(is_local_reference);
                if !is_local {
                    self.output.missed(&display);
                }
            }
        }

        Ok(resolved)
    }

    /// Resolve a URI reference, narrating the result
    pub fn resolve_uri(
        &self,
        href: &str,
        base: Option<&Url>,
    ) -> Result<Option<ResolvedResource>> {
        let resolved = match &self.inner {
            Some(inner) => inner.resolve_uri(href, base)?,
            None => None,
        };

        let display = match base {
            Some(base) => format!("{} ({})", href, base),
            None => href.to_string(),
        };

        match &resolved {
            Some(resource) => {
                self.output.resolved(
                    &display,
                    resource.uri.as_str(),
                    Some(&resource.local_path.display().to_string()),
                );
            }
            None => self.output.missed(&display),
        }

        Ok(resolved)
    }

    /// Resolve an external entity with full context: entity name and a
    /// base URI for relative system identifiers. Unlike the two-argument
    /// form, misses are always reported.
    pub fn resolve_entity_ext(
        &self,
        name: Option<&str>,
        public_id: Option<&str>,
        base: Option<&Url>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedResource>> {
        let resolved = match &self.inner {
            Some(inner) => inner.resolve_entity_ids(public_id, system_id, base)?,
            None => None,
        };

        let mut display = String::new();
        if let Some(name) = name {
            display.push_str(name);
            display.push_str(": ");
        }
        if let Some(system) = system_id {
            display.push_str(&absolutized(system, base));
        }
        if let Some(public) = public_id {
            display.push_str(&format!(" ({})", public));
        }

        self.narrate(&display, &resolved);
        Ok(resolved)
    }

    /// Resolve the external subset for a named document type
    pub fn external_subset(
        &self,
        name: &str,
        base: Option<&Url>,
    ) -> Result<Option<ResolvedResource>> {
        let resolved = match &self.inner {
            Some(inner) => inner.resolve_doctype(name)?,
            None => None,
        };

        let display = match base {
            Some(base) => format!("{} ({})", name, base),
            None => name.to_string(),
        };

        self.narrate(&display, &resolved);
        Ok(resolved)
    }

    /// Resolve a schema-style resource request: a namespace plus optional
    /// identifiers, as a schema processor would ask for an import.
    pub fn resolve_resource(
        &self,
        nature: Option<&str>,
        namespace: Option<&str>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        base: Option<&Url>,
    ) -> Result<Option<ResolvedResource>> {
        let resolved = match &self.inner {
            Some(inner) => inner.resolve_resource(namespace, public_id, system_id, nature, base)?,
            None => None,
        };

        let mut display = String::new();
        if let Some(nature) = nature {
            display.push_str(nature);
            display.push_str(": ");
        }
        if let Some(system) = system_id {
            display.push_str(&absolutized(system, base));
        }
        if let Some(namespace) = namespace {
            display.push_str(&format!(" ({})", namespace));
        }
        if let Some(public) = public_id {
            display.push_str(&format!(" ({})", public));
        }

        self.narrate(&display, &resolved);
        Ok(resolved)
    }

    fn narrate(&self, display: &str, resolved: &Option<ResolvedResource>) {
        match resolved {
            Some(resource) => self.output.resolved(
                display,
                resource.uri.as_str(),
                Some(&resource.local_path.display().to_string()),
            ),
            None => self.output.missed(display),
        }
    }
}

/// Local files that were never in any catalog are expected misses: both
/// file: URLs and the plain filesystem paths libxml2 passes for local
/// documents stay out of the narration.
fn is_local_reference(reference: &str) -> bool {
    reference.starts_with("file:") || Url::parse(reference).is_err()
}

/// A relative reference shown the way the parser will actually request it
fn absolutized(reference: &str, base: Option<&Url>) -> String {
    match base {
        Some(base) => base
            .join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
        None => reference.to_string(),
    }
}

/// Parse-time hook: libxml2 hands every external entity reference to the
/// chatty resolver. Failures fall back to libxml2's default loader.
impl EntityResolver for ChattyResolver {
    fn resolve_entity(&self, url: Option<&str>, id: Option<&str>) -> Option<PathBuf> {
        match ChattyResolver::resolve_entity(self, id, url) {
            Ok(resolved) => resolved.map(|r| r.local_path),
            Err(e) => {
                warn!(url = ?url, id = ?id, error = %e, "entity resolution failed");
                None
            }
        }
    }
}
