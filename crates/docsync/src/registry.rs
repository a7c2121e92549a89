use std::collections::HashMap;

use crate::source::{ChannelSpec, MergeSpec, RefType, RepoSpec, Source, SourceError, SourceType};

/// Catalog of configured sync targets.
pub trait SourceRegistry: Send + Sync {
    fn list_sources(&self) -> Vec<Source>;

    fn get_source(&self, id: &str) -> Option<Source> {
        self.list_sources().into_iter().find(|s| s.id == id)
    }

    fn list_sources_by_type(&self, source_type: SourceType) -> Vec<Source> {
        self.list_sources()
            .into_iter()
            .filter(|s| s.source_type() == source_type)
            .collect()
    }
}

/// A registry backed by a fixed, validated list.
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    sources: Vec<Source>,
}

impl StaticRegistry {
    /// Build a registry, rejecting duplicate ids and output folders that
    /// are equal or nested inside one another.
    pub fn new(sources: Vec<Source>) -> Result<Self, SourceError> {
        let mut ids: HashMap<&str, ()> = HashMap::new();
        let mut folders: Vec<(&str, &str)> = Vec::new();

        for source in &sources {
            source.validate()?;

            if ids.insert(&source.id, ()).is_some() {
                return Err(SourceError::DuplicateId(source.id.clone()));
            }

            let folder = source.output_folder();
            if let Some((_, owner)) = folders.iter().find(|(f, _)| folders_overlap(f, folder)) {
                return Err(SourceError::FolderConflict {
                    folder: folder.to_owned(),
                    first: (*owner).to_owned(),
                    second: source.id.clone(),
                });
            }
            folders.push((folder, &source.id));
        }

        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceRegistry for StaticRegistry {
    fn list_sources(&self) -> Vec<Source> {
        self.sources.clone()
    }

    fn get_source(&self, id: &str) -> Option<Source> {
        self.sources.iter().find(|s| s.id == id).cloned()
    }
}

/// Each source clears its own folder before writing, so neither folder
/// may contain the other.
fn folders_overlap(a: &str, b: &str) -> bool {
    fn segments(f: &str) -> Vec<&str> {
        f.split('/').filter(|s| !s.is_empty() && *s != ".").collect::<Vec<_>>()
    }
    let (a, b) = (segments(a), segments(b));
    a.starts_with(&b) || b.starts_with(&a)
}

fn docs_repo(id: &str, label: &str, location: &str, git_ref: &str, subpath: &str) -> Source {
    let mut spec = RepoSpec::new(location, git_ref);
    spec.content_subpath = subpath.to_owned();
    Source::repo(id, label, spec)
}

/// Built-in catalogue used when no configuration file provides sources.
pub fn default_sources() -> Vec<Source> {
    let mut nuxt = RepoSpec::new("nuxt/nuxt", "main");
    nuxt.content_subpath = "docs".into();
    nuxt.additional_merges.push(MergeSpec {
        location: "nuxt/nuxt.com".into(),
        git_ref: "main".into(),
        content_subpath: "content".into(),
    });

    let mut nitro = RepoSpec::new("nitrojs/nitro", "v3");
    nitro.content_subpath = "docs".into();

    let mut vue = RepoSpec::new("vuejs/docs", "latest");
    vue.ref_type = RefType::Release;
    vue.content_subpath = "src".into();

    vec![
        Source::repo("nuxt", "Nuxt", nuxt),
        Source::repo("nitro", "Nitro", nitro),
        docs_repo("nuxt-ui", "Nuxt UI", "nuxt/ui", "v4", "docs/content"),
        docs_repo("nuxt-content", "Nuxt Content", "nuxt/content", "main", "docs/content"),
        docs_repo("nuxt-hub", "NuxtHub", "nuxt-hub/core", "main", "docs/content"),
        Source::repo("vue", "Vue", vue),
        Source::readme_only("unjs-h3", "h3", RepoSpec::new("h3js/h3", "main")),
        Source::channel(
            "alex-lichter",
            "Alexander Lichter",
            ChannelSpec {
                channel_id: "UCqFPgMzGbLjd-MX-h3Z5aQA".into(),
                handle: Some("@TheAlexLichter".into()),
                max_items: 50,
                output_folder: Some("youtube".into()),
            },
        ),
    ]
}
