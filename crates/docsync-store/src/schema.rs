use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE source_versions (
                source_id            TEXT NOT NULL,
                version_folder_name  TEXT NOT NULL,
                ref_type             TEXT NOT NULL,
                resolved_ref         TEXT NOT NULL,
                synced_at            INTEGER NOT NULL,
                PRIMARY KEY (source_id, version_folder_name)
            );

            CREATE INDEX idx_source_versions_synced_at ON source_versions(synced_at);",
        ),
        M::up(
            "CREATE TABLE workflow_checkpoints (
                run_id      TEXT NOT NULL,
                step_id     TEXT NOT NULL,
                input_hash  TEXT NOT NULL,
                output      TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (run_id, step_id, input_hash)
            );",
        ),
    ])
}
