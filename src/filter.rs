//! Narrowing the repository list the way the dashboards' filter bar does.

use crate::registry::Source;
use crate::store::RepositoryMeta;

const ALL_ARCHITECTURES: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryFilter {
    /// Case-insensitive substring of the name or namespace
    pub search: Option<String>,
    /// Exact architecture; `None` or `"all"` keeps every repository
    pub architecture: Option<String>,
    /// Source hosts to keep; empty keeps every source
    pub sources: Vec<String>,
    pub show_untagged: bool,
}

impl RepositoryFilter {
    pub fn apply(&self, metas: &[RepositoryMeta], sources: &[Source]) -> Vec<RepositoryMeta> {
        metas
            .iter()
            .filter(|meta| self.matches(meta, sources))
            .cloned()
            .collect()
    }

    pub fn matches(&self, meta: &RepositoryMeta, sources: &[Source]) -> bool {
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = meta.name.to_lowercase().contains(&needle);
            let in_namespace = meta
                .namespace
                .as_ref()
                .is_some_and(|ns| ns.to_lowercase().contains(&needle));
            if !in_name && !in_namespace {
                return false;
            }
        }

        if let Some(architecture) = self
            .architecture
            .as_deref()
            .filter(|a| *a != ALL_ARCHITECTURES)
        {
            if !meta.architectures.iter().any(|a| a == architecture) {
                return false;
            }
        }

        if !self.sources.is_empty() {
            let host = sources
                .iter()
                .find(|s| s.name == meta.source)
                .map(|s| s.display_host())
                .unwrap_or("Unknown");
            if !self.sources.iter().any(|h| h == host) {
                return false;
            }
        }

        self.show_untagged || !meta.is_untagged()
    }
}
