use anyhow::Result;
use docsync_store::SyncStore;

use super::format;

pub fn run(store: &SyncStore, source_id: Option<&str>) -> Result<()> {
    let records = store.versions(source_id)?;
    format::print_versions(&records);

    if source_id.is_none()
        && let Some(last) = store.last_synced_at()?
    {
        println!("\nlast sync: {}", format::format_timestamp(last));
    }
    Ok(())
}
