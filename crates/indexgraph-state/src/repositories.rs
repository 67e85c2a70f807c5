use indexgraph_core::error::StateError;
use indexgraph_core::types::{Repository, RepositoryOwner};
use rusqlite::{Connection, params};

/// Register or update a tracked repository.
pub fn upsert_repository(conn: &Connection, repo: &Repository) -> Result<(), StateError> {
    let (owner_kind, owner_ref) = owner_columns(&repo.owner);
    conn.execute(
        "INSERT INTO repositories (id, full_name, default_ref, installation_id, owner_kind, owner_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           full_name = excluded.full_name,
           default_ref = excluded.default_ref,
           installation_id = excluded.installation_id,
           owner_kind = excluded.owner_kind,
           owner_ref = excluded.owner_ref",
        params![
            repo.id,
            repo.full_name,
            repo.default_ref,
            repo.installation_id,
            owner_kind,
            owner_ref,
        ],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, repository_id: &str) -> Result<Option<Repository>, StateError> {
    let result = conn.query_row(
        "SELECT id, full_name, default_ref, installation_id, owner_kind, owner_ref
         FROM repositories WHERE id = ?1",
        params![repository_id],
        row_to_repository,
    );
    match result {
        Ok(repo) => Ok(Some(repo)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

pub fn get_by_full_name(conn: &Connection, full_name: &str) -> Result<Option<Repository>, StateError> {
    let result = conn.query_row(
        "SELECT id, full_name, default_ref, installation_id, owner_kind, owner_ref
         FROM repositories WHERE full_name = ?1",
        params![full_name],
        row_to_repository,
    );
    match result {
        Ok(repo) => Ok(Some(repo)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

/// All registered repositories, ordered by id. Used by the export side of
/// the sync layer.
pub fn list_all(conn: &Connection) -> Result<Vec<Repository>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, full_name, default_ref, installation_id, owner_kind, owner_ref
             FROM repositories ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt.query_map([], row_to_repository).map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

fn owner_columns(owner: &RepositoryOwner) -> (&'static str, String) {
    match owner {
        RepositoryOwner::User { user_id } => ("user", user_id.clone()),
        RepositoryOwner::Org { org_id } => ("org", org_id.clone()),
    }
}

fn row_to_repository(row: &rusqlite::Row) -> rusqlite::Result<Repository> {
    let owner_kind: String = row.get(4)?;
    let owner_ref: String = row.get(5)?;
    let owner = match owner_kind.as_str() {
        "org" => RepositoryOwner::Org { org_id: owner_ref },
        _ => RepositoryOwner::User { user_id: owner_ref },
    };
    Ok(Repository {
        id: row.get(0)?,
        full_name: row.get(1)?,
        default_ref: row.get(2)?,
        installation_id: row.get(3)?,
        owner,
    })
}
