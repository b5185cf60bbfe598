use crate::domain::error::PipelineError;
use crate::domain::ports::{MetadataStore, TableScope};
use crate::domain::text2sql_entities::{ColumnDescription, TableDescription};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableContext {
    pub table: TableDescription,
    /// Sorted by column name.
    pub columns: Vec<ColumnDescription>,
}

impl TableContext {
    pub fn name(&self) -> &str {
        &self.table.table_name
    }

    /// Compact fact list for one table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let t = &self.table;

        match &t.display_name {
            Some(alias) if !alias.is_empty() => {
                let _ = writeln!(out, "### {} ({})", t.table_name, alias);
            }
            _ => {
                let _ = writeln!(out, "### {}", t.table_name);
            }
        }
        if let Some(purpose) = t.business_purpose.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "Purpose: {}", purpose);
        }
        if let Some(description) = t.description.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "Description: {}", description);
        }
        if !t.related_tables.is_empty() {
            let _ = writeln!(out, "Related tables: {}", t.related_tables.join(", "));
        }

        if !self.columns.is_empty() {
            let _ = writeln!(out, "Columns:");
            for column in &self.columns {
                let _ = writeln!(out, "- {}", render_column(column));
            }
        }
        out
    }
}

fn render_column(c: &ColumnDescription) -> String {
    let mut line = c.column_name.clone();
    if let Some(data_type) = c.data_type.as_deref().filter(|s| !s.is_empty()) {
        line.push(' ');
        line.push_str(&data_type.to_uppercase());
    }
    if c.is_primary_key {
        line.push_str(" PK");
    }
    if c.is_nullable == Some(false) {
        line.push_str(" NOT NULL");
    }

    let mut facts: Vec<String> = Vec::new();
    if let Some(name) = c.display_name.as_deref().filter(|s| !s.is_empty()) {
        facts.push(name.to_string());
    }
    if let Some(description) = c.description.as_deref().filter(|s| !s.is_empty()) {
        facts.push(description.to_string());
    }
    if let Some(meaning) = c.business_meaning.as_deref().filter(|s| !s.is_empty()) {
        facts.push(format!("meaning: {}", meaning));
    }
    if !c.related_columns.is_empty() {
        facts.push(format!("refs: {}", c.related_columns.join(", ")));
    }
    if !c.example_values.is_empty() {
        facts.push(format!("e.g. {}", c.example_values.join(", ")));
    }

    if facts.is_empty() {
        line
    } else {
        format!("{}: {}", line, facts.join(" | "))
    }
}

/// Table descriptions joined with their columns, ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaContext {
    pub tables: Vec<TableContext>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table.table_name.clone()).collect()
    }

    /// Joins descriptions into per-table entries. Columns without a table
    /// description still get an entry carrying only the table name.
    pub fn assemble(tables: Vec<TableDescription>, columns: Vec<ColumnDescription>) -> Self {
        let mut by_name: BTreeMap<String, TableContext> = BTreeMap::new();

        for table in tables {
            by_name.insert(
                table.table_name.clone(),
                TableContext {
                    table,
                    columns: Vec::new(),
                },
            );
        }
        for column in columns {
            by_name
                .entry(column.table_name.clone())
                .or_insert_with(|| TableContext {
                    table: TableDescription {
                        table_name: column.table_name.clone(),
                        display_name: None,
                        description: None,
                        business_purpose: None,
                        related_tables: Vec::new(),
                    },
                    columns: Vec::new(),
                })
                .columns
                .push(column);
        }

        let tables = by_name
            .into_values()
            .map(|mut t| {
                t.columns.sort_by(|a, b| a.column_name.cmp(&b.column_name));
                t
            })
            .collect();

        Self { tables }
    }
}

pub struct SchemaContextBuilder {
    store: Arc<dyn MetadataStore>,
}

impl SchemaContextBuilder {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Fails with `SchemaLookup` when the metadata store cannot be read.
    pub async fn build(&self, scope: &TableScope) -> Result<SchemaContext, PipelineError> {
        let (tables, columns) = tokio::try_join!(
            self.store.table_descriptions(scope),
            self.store.column_descriptions(scope)
        )
        .map_err(|e| {
            error!("Schema lookup failed: {}", e);
            PipelineError::SchemaLookup(e.to_string())
        })?;

        let tables = tables.into_iter().filter(|t| scope.includes(&t.table_name)).collect();
        let columns = columns
            .into_iter()
            .filter(|c| scope.includes(&c.table_name))
            .collect();

        let context = SchemaContext::assemble(tables, columns);
        debug!("Schema context covers {} tables", context.tables.len());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::memory::InMemoryMetadataStore;

    fn column(table: &str, name: &str, data_type: &str) -> ColumnDescription {
        ColumnDescription {
            table_name: table.to_string(),
            column_name: name.to_string(),
            display_name: None,
            description: None,
            business_meaning: None,
            data_type: Some(data_type.to_string()),
            is_nullable: None,
            is_primary_key: false,
            example_values: Vec::new(),
            related_columns: Vec::new(),
        }
    }

    fn table(name: &str, alias: &str) -> TableDescription {
        TableDescription {
            table_name: name.to_string(),
            display_name: Some(alias.to_string()),
            description: None,
            business_purpose: Some(format!("{} records", name)),
            related_tables: Vec::new(),
        }
    }

    #[test]
    fn test_assemble_orders_tables_and_columns() {
        let context = SchemaContext::assemble(
            vec![table("sales", "매출"), table("employees", "직원")],
            vec![
                column("employees", "salary", "numeric"),
                column("sales", "amount", "numeric"),
                column("employees", "id", "integer"),
            ],
        );
        assert_eq!(context.table_names(), vec!["employees", "sales"]);
        let cols: Vec<&str> = context.tables[0]
            .columns
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        assert_eq!(cols, vec!["id", "salary"]);
    }

    #[test]
    fn test_orphan_columns_get_a_table_entry() {
        let context = SchemaContext::assemble(vec![], vec![column("projects", "budget", "numeric")]);
        assert_eq!(context.table_names(), vec!["projects"]);
        assert!(context.tables[0].table.display_name.is_none());
    }

    #[test]
    fn test_render_includes_alias_types_and_examples() {
        let mut salary = column("employees", "salary", "numeric");
        salary.display_name = Some("급여".to_string());
        salary.is_nullable = Some(false);
        salary.example_values = vec!["5000000".to_string(), "6500000".to_string()];
        let mut id = column("employees", "id", "integer");
        id.is_primary_key = true;

        let context = SchemaContext::assemble(vec![table("employees", "직원")], vec![salary, id]);
        let rendered = context.tables[0].render();

        assert!(rendered.starts_with("### employees (직원)\n"));
        assert!(rendered.contains("Purpose: employees records"));
        assert!(rendered.contains("- id INTEGER PK\n"));
        assert!(rendered.contains("- salary NUMERIC NOT NULL: 급여 | e.g. 5000000, 6500000"));
    }

    #[tokio::test]
    async fn test_build_respects_scope() {
        let store = Arc::new(InMemoryMetadataStore::default());
        store.add_table(table("employees", "직원"));
        store.add_table(table("sales", "매출"));
        store.add_column(column("sales", "amount", "numeric"));

        let builder = SchemaContextBuilder::new(store);
        let context = builder
            .build(&TableScope::Tables(vec!["SALES".to_string()]))
            .await
            .unwrap();
        assert_eq!(context.table_names(), vec!["sales"]);
        assert_eq!(context.tables[0].columns.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_schema_lookup_error() {
        let store = Arc::new(InMemoryMetadataStore::default());
        store.set_unavailable(true);

        let builder = SchemaContextBuilder::new(store);
        let err = builder.build(&TableScope::All).await.unwrap_err();
        assert_eq!(err.kind(), "SchemaLookupError");
        assert!(err.is_fatal());
    }
}
