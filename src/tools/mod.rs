pub mod access;
pub mod attachments;
pub mod columns;
pub mod documents;
pub mod exports;
pub mod forms;
pub mod orgs;
pub mod param_enums;
pub mod records;
pub mod sql;
pub mod tables;
pub mod webhooks;
pub mod workspaces;

use crate::client::GristClient;
use crate::formula::{FormulaColumnMap, TableCheck, check_table};
use anyhow::{Context, Result};

pub(crate) async fn table_check(
    client: &GristClient,
    doc_id: &str,
    table_id: &str,
) -> Result<TableCheck> {
    let tables = client
        .list_tables(doc_id)
        .await
        .context("could not validate table")?;
    Ok(check_table(doc_id, table_id, &tables))
}

pub(crate) async fn formula_map(
    client: &GristClient,
    doc_id: &str,
    table_id: &str,
) -> Result<FormulaColumnMap> {
    let columns = client
        .list_columns(doc_id, table_id)
        .await
        .context("could not load table columns")?;
    Ok(FormulaColumnMap::from_columns(&columns))
}
