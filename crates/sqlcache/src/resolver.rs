//! Table identity resolution
//!
//! A cached result is named after the one source table it was selected
//! from. Queries whose select list spans several tables, or no table at all,
//! have no such name and are rejected.

use serde::{Deserialize, Serialize};
use sqlcache_core::{CacheError, Result, SelectQuery};

/// Which parts of a query must agree on the target table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Every table referenced anywhere in the query must be the selected one
    #[default]
    Strict,
    /// Only the select list is inspected; filters and joins may reach other tables
    SelectedColumns,
}

/// Derive the cache name of `query` under the default policy
pub fn resolve_table(query: &SelectQuery) -> Result<&str> {
    resolve_table_with(query, ResolutionPolicy::default())
}

pub fn resolve_table_with(query: &SelectQuery, policy: ResolutionPolicy) -> Result<&str> {
    let selected = query.selected_tables();
    let mut tables = selected.iter();

    let name = match (tables.next(), tables.next()) {
        (Some(name), None) => *name,
        (None, _) => {
            return Err(CacheError::UnsupportedQuery(
                "query selects no columns of a source table".to_string(),
            ))
        }
        (Some(_), Some(_)) => {
            let names: Vec<&str> = selected.iter().copied().collect();
            return Err(CacheError::UnsupportedQuery(format!(
                "query selects columns from multiple tables: {}",
                names.join(", ")
            )));
        }
    };

    if policy == ResolutionPolicy::Strict {
        let others: Vec<&str> = query
            .referenced_tables()
            .into_iter()
            .filter(|table| *table != name)
            .collect();
        if !others.is_empty() {
            return Err(CacheError::UnsupportedQuery(format!(
                "query on '{}' also references {}",
                name,
                others.join(", ")
            )));
        }
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcache_core::{DataType, TableDef};

    fn users() -> TableDef {
        TableDef::new("users")
            .column("id", DataType::Int64, false)
            .column("name", DataType::Utf8, false)
    }

    fn records() -> TableDef {
        TableDef::new("records")
            .column("id", DataType::Int64, false)
            .column("user_id", DataType::Int64, false)
    }

    #[test]
    fn test_single_table() {
        assert_eq!(resolve_table(&users().select()).unwrap(), "users");
    }

    #[test]
    fn test_subset_of_columns() {
        let users = users();
        let query = SelectQuery::new()
            .column_as(users.col("name").unwrap(), "username")
            .filter(users.col("id").unwrap().gt(1i64));
        assert_eq!(resolve_table(&query).unwrap(), "users");
    }

    #[test]
    fn test_multiple_tables_rejected() {
        let (users, records) = (users(), records());
        let query = SelectQuery::new()
            .column(users.col("id").unwrap())
            .column(records.col("user_id").unwrap());

        for policy in [ResolutionPolicy::Strict, ResolutionPolicy::SelectedColumns] {
            let err = resolve_table_with(&query, policy).unwrap_err();
            assert!(err.is_unsupported());
            assert!(err.to_string().contains("records, users"));
        }
    }

    #[test]
    fn test_literal_only_rejected() {
        let query = SelectQuery::new().literal(1i64, DataType::Int64, "one");
        assert!(resolve_table(&query).unwrap_err().is_unsupported());
        assert!(resolve_table(&SelectQuery::new()).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_literal_with_column() {
        let query = users().select().literal("x", DataType::Utf8, "tag");
        assert_eq!(resolve_table(&query).unwrap(), "users");
    }

    #[test]
    fn test_join_depends_on_policy() {
        let (users, records) = (users(), records());
        let query = users
            .select()
            .join(
                &records,
                users.col("id").unwrap().eq_col(&records.col("user_id").unwrap()),
            );

        assert!(resolve_table_with(&query, ResolutionPolicy::Strict)
            .unwrap_err()
            .is_unsupported());
        assert_eq!(
            resolve_table_with(&query, ResolutionPolicy::SelectedColumns).unwrap(),
            "users"
        );
    }

    #[test]
    fn test_filter_on_other_table() {
        let (users, records) = (users(), records());
        let query = users.select().filter(records.col("id").unwrap().eq(1i64));

        let err = resolve_table(&query).unwrap_err();
        assert!(err.to_string().contains("also references records"));
        assert!(resolve_table_with(&query, ResolutionPolicy::SelectedColumns).is_ok());
    }
}
