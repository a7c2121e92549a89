use docsync::{Source, SourceKind, SyncRunResult, VersionRecord};

const MAX_ID_WIDTH: usize = 24;
const LINE_BUDGET: usize = 100;

pub fn print_source_table(sources: &[Source]) {
    if sources.is_empty() {
        println!("No sources configured.");
        return;
    }

    let id_width = column_width(sources.iter().map(|s| s.id.as_str()));
    let type_width = column_width(sources.iter().map(|s| type_name(s)));
    let origin_budget = LINE_BUDGET.saturating_sub(2 + id_width + 2 + type_width + 2);

    for source in sources {
        let origin = format!("{}  -> docs/{}", origin(source), source.output_folder());
        println!(
            "  {:<id_width$}  {:<type_width$}  {}",
            truncate(&source.id, id_width),
            type_name(source),
            truncate(&origin, origin_budget),
        );
    }

    println!("\n{} sources", sources.len());
}

pub fn print_run_report(run: &SyncRunResult) {
    for result in &run.results {
        let status = if result.success { "ok" } else { "FAILED" };
        let version = result
            .version_folder_name
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default();
        println!(
            "  {:<6}  {}{version}  {} files  {}ms",
            status, result.source_id, result.file_count, result.duration_ms
        );
        if let Some(error) = &result.error {
            println!("          {error}");
        }
        for warning in &result.warnings {
            println!("          warning: {warning}");
        }
    }

    match &run.push {
        Some(push) if push.success => println!(
            "\nPushed {} files in commit {}",
            push.files_changed.unwrap_or_default(),
            push.commit_sha.as_deref().unwrap_or("?")
        ),
        Some(push) => println!(
            "\nPush failed: {}",
            push.error.as_deref().unwrap_or("unknown error")
        ),
        None => println!("\nNothing pushed"),
    }

    println!(
        "{}/{} sources, {} files",
        run.summary.success, run.summary.total, run.summary.files
    );
}

pub fn print_versions(records: &[VersionRecord]) {
    if records.is_empty() {
        println!("No versions recorded yet.");
        return;
    }

    let id_width = column_width(records.iter().map(|r| r.source_id.as_str()));
    let folder_width = records
        .iter()
        .map(|r| r.version_folder_name.chars().count())
        .max()
        .unwrap_or(0);

    for record in records {
        println!(
            "  {:<id_width$}  {:<folder_width$}  {}",
            truncate(&record.source_id, id_width),
            record.version_folder_name,
            format_timestamp(record.synced_at),
        );
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .map(|v| v.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_ID_WIDTH)
}

fn type_name(source: &Source) -> &'static str {
    match &source.kind {
        SourceKind::Repo(_) => "repo",
        SourceKind::ReadmeOnlyRepo(_) => "readme-only-repo",
        SourceKind::Channel(_) => "channel",
        SourceKind::Custom(_) => "custom",
    }
}

fn origin(source: &Source) -> String {
    match &source.kind {
        SourceKind::Repo(spec) if spec.content_subpath.is_empty() => {
            format!("{}@{}", spec.location, spec.git_ref)
        }
        SourceKind::Repo(spec) => {
            format!("{}@{}:{}", spec.location, spec.git_ref, spec.content_subpath)
        }
        SourceKind::ReadmeOnlyRepo(spec) => format!("{}@{}:README.md", spec.location, spec.git_ref),
        SourceKind::Channel(spec) => match &spec.handle {
            Some(handle) => format!("{handle} ({})", spec.channel_id),
            None => spec.channel_id.clone(),
        },
        SourceKind::Custom(_) => "-".into(),
    }
}

pub fn format_timestamp(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
