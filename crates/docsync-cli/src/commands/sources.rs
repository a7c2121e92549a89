use anyhow::Result;
use docsync::{SourceRegistry, SourceType};

use super::format;

pub fn run(registry: &dyn SourceRegistry, type_filter: Option<&str>) -> Result<()> {
    let sources = match type_filter {
        Some(name) => {
            let source_type = SourceType::parse(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown source type '{name}' (expected repo, readme-only-repo, channel or custom)"
                )
            })?;
            registry.list_sources_by_type(source_type)
        }
        None => registry.list_sources(),
    };

    format::print_source_table(&sources);
    Ok(())
}
