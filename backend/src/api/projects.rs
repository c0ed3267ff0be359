//! Project listing endpoint data.

use crate::db_utils::clickhouse_utils::{self, ProjectInfo};

pub async fn list_projects() -> anyhow::Result<Vec<ProjectInfo>> {
    clickhouse_utils::list_projects().await
}
