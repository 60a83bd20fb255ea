//! Structured single-target selections over a source schema
//!
//! A [`SelectQuery`] keeps every selected column attributable to the source
//! table that owns it. That attribution is what lets the cache name the
//! materialized result after a table, and what lets any SQL source execute
//! the query through [`SelectQuery::to_sql`].

use crate::error::{CacheError, Result};
use crate::schema::{Field, Schema};
use crate::types::{ColumnInfo, DataType, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Definition of a table in the source schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnInfo>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column definition
    pub fn column(mut self, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        self.columns.push(ColumnInfo::new(name, data_type, nullable));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Reference a column of this table
    pub fn col(&self, name: &str) -> Result<ColumnRef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| ColumnRef::new(&self.name, &c.name, c.data_type, c.nullable))
            .ok_or_else(|| CacheError::ColumnNotFound(format!("{}.{}", self.name, name)))
    }

    pub fn all_columns(&self) -> Vec<ColumnRef> {
        self.columns
            .iter()
            .map(|c| ColumnRef::new(&self.name, &c.name, c.data_type, c.nullable))
            .collect()
    }

    /// `SELECT <all columns> FROM <this table>`
    pub fn select(&self) -> SelectQuery {
        SelectQuery::columns(self.all_columns()).from(self)
    }
}

/// A column qualified by the source table that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    table: String,
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl ColumnRef {
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::Eq, value)
    }

    pub fn not_eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::NotEq, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::Lt, value)
    }

    pub fn lt_eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::LtEq, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::Gt, value)
    }

    pub fn gt_eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(BinaryOp::GtEq, value)
    }

    /// Equality between two columns, typically a join condition
    pub fn eq_col(&self, other: &ColumnRef) -> Expr {
        Expr::binary(
            Expr::Column(self.clone()),
            BinaryOp::Eq,
            Expr::Column(other.clone()),
        )
    }

    pub fn is_null(&self) -> Expr {
        Expr::IsNull(Box::new(Expr::Column(self.clone())))
    }

    pub fn is_not_null(&self) -> Expr {
        Expr::IsNotNull(Box::new(Expr::Column(self.clone())))
    }

    fn compare(&self, op: BinaryOp, value: impl Into<Value>) -> Expr {
        Expr::binary(
            Expr::Column(self.clone()),
            op,
            Expr::Literal(value.into()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Boolean and comparison expressions used in join conditions and filters
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

impl Expr {
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    fn collect_tables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Column(c) => {
                out.insert(c.table());
            }
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => e.collect_tables(out),
        }
    }

    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Expr::Column(c) => render_column(sql, c),
            Expr::Literal(v) => {
                sql.push('?');
                params.push(v.clone());
            }
            Expr::Binary { left, op, right } => {
                sql.push('(');
                left.render(sql, params);
                let _ = write!(sql, " {} ", op.as_sql());
                right.render(sql, params);
                sql.push(')');
            }
            Expr::Not(e) => {
                sql.push_str("(NOT ");
                e.render(sql, params);
                sql.push(')');
            }
            Expr::IsNull(e) => {
                sql.push('(');
                e.render(sql, params);
                sql.push_str(" IS NULL)");
            }
            Expr::IsNotNull(e) => {
                sql.push('(');
                e.render(sql, params);
                sql.push_str(" IS NOT NULL)");
            }
        }
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    /// Computed constant; owned by no source table
    Literal {
        value: Value,
        data_type: DataType,
        alias: String,
    },
}

impl SelectItem {
    /// Name of the output column
    pub fn output_name(&self) -> &str {
        match self {
            SelectItem::Column { column, alias } => alias.as_deref().unwrap_or(column.name()),
            SelectItem::Literal { alias, .. } => alias,
        }
    }

    /// Source table owning this item, `None` for literals
    pub fn table(&self) -> Option<&str> {
        match self {
            SelectItem::Column { column, .. } => Some(column.table()),
            SelectItem::Literal { .. } => None,
        }
    }

    pub fn output_field(&self) -> Field {
        match self {
            SelectItem::Column { column, .. } => {
                Field::new(self.output_name(), column.data_type(), column.nullable())
            }
            SelectItem::Literal {
                value, data_type, ..
            } => Field::new(self.output_name(), *data_type, value.is_null()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub ascending: bool,
}

/// A parameterized SQL statement with `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    projection: Vec<SelectItem>,
    from: Option<String>,
    joins: Vec<Join>,
    filter: Option<Expr>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the given columns, in order
    pub fn columns(columns: impl IntoIterator<Item = ColumnRef>) -> Self {
        let projection = columns
            .into_iter()
            .map(|column| SelectItem::Column {
                column,
                alias: None,
            })
            .collect();
        Self {
            projection,
            ..Self::default()
        }
    }

    pub fn column(mut self, column: ColumnRef) -> Self {
        self.projection.push(SelectItem::Column {
            column,
            alias: None,
        });
        self
    }

    pub fn column_as(mut self, column: ColumnRef, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem::Column {
            column,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn literal(
        mut self,
        value: impl Into<Value>,
        data_type: DataType,
        alias: impl Into<String>,
    ) -> Self {
        self.projection.push(SelectItem::Literal {
            value: value.into(),
            data_type,
            alias: alias.into(),
        });
        self
    }

    pub fn from(mut self, table: &TableDef) -> Self {
        self.from = Some(table.name().to_string());
        self
    }

    /// Inner join against another source table
    pub fn join(mut self, table: &TableDef, on: Expr) -> Self {
        self.joins.push(Join {
            table: table.name().to_string(),
            on,
        });
        self
    }

    /// Add a filter; repeated calls are combined with `AND`
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, column: ColumnRef, ascending: bool) -> Self {
        self.order_by.push(OrderBy { column, ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(&self) -> &[SelectItem] {
        &self.projection
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn selection(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    /// Driving table: the explicit `FROM`, else the owner of the first selected column
    pub fn from_table(&self) -> Option<&str> {
        self.from
            .as_deref()
            .or_else(|| self.projection.iter().find_map(|item| item.table()))
    }

    /// Distinct source tables owning the selected columns
    pub fn selected_tables(&self) -> BTreeSet<&str> {
        self.projection.iter().filter_map(|item| item.table()).collect()
    }

    /// Distinct source tables referenced anywhere in the query
    pub fn referenced_tables(&self) -> BTreeSet<&str> {
        let mut tables = self.selected_tables();
        if let Some(from) = self.from.as_deref() {
            tables.insert(from);
        }
        for join in &self.joins {
            tables.insert(join.table.as_str());
            join.on.collect_tables(&mut tables);
        }
        if let Some(filter) = &self.filter {
            filter.collect_tables(&mut tables);
        }
        for order in &self.order_by {
            tables.insert(order.column.table());
        }
        tables
    }

    /// Declared output schema, one field per select item
    pub fn output_schema(&self) -> Schema {
        Schema::new(self.projection.iter().map(|item| item.output_field()).collect())
    }

    pub fn to_sql(&self) -> Result<SqlStatement> {
        if self.projection.is_empty() {
            return Err(CacheError::UnsupportedQuery(
                "query selects no columns".to_string(),
            ));
        }

        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        for (i, item) in self.projection.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            match item {
                SelectItem::Column { column, .. } => render_column(&mut sql, column),
                SelectItem::Literal { value, .. } => {
                    sql.push('?');
                    params.push(value.clone());
                }
            }
            sql.push_str(" AS ");
            push_ident(&mut sql, item.output_name());
        }

        if let Some(from) = self.from_table() {
            sql.push_str(" FROM ");
            push_ident(&mut sql, from);
        }

        for join in &self.joins {
            sql.push_str(" INNER JOIN ");
            push_ident(&mut sql, &join.table);
            sql.push_str(" ON ");
            join.on.render(&mut sql, &mut params);
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(&mut sql, &mut params);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                render_column(&mut sql, &order.column);
                sql.push_str(if order.ascending { " ASC" } else { " DESC" });
            }
        }

        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }

        Ok(SqlStatement { sql, params })
    }
}

fn render_column(sql: &mut String, column: &ColumnRef) {
    push_ident(sql, column.table());
    sql.push('.');
    push_ident(sql, column.name());
}

fn push_ident(sql: &mut String, ident: &str) {
    sql.push('"');
    sql.push_str(&ident.replace('"', "\"\""));
    sql.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef::new("users")
            .column("id", DataType::Int64, false)
            .column("name", DataType::Utf8, false)
    }

    fn records() -> TableDef {
        TableDef::new("records")
            .column("id", DataType::Int64, false)
            .column("user_id", DataType::Int64, false)
            .column("data", DataType::Utf8, true)
    }

    #[test]
    fn test_select_all_renders_sql() {
        let stmt = users().select().to_sql().unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT "users"."id" AS "id", "users"."name" AS "name" FROM "users""#
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_join_filter_and_params() {
        let users = users();
        let records = records();
        let query = records
            .select()
            .join(&users, records.col("user_id").unwrap().eq_col(&users.col("id").unwrap()))
            .filter(
                users
                    .col("name")
                    .unwrap()
                    .eq("a")
                    .or(users.col("name").unwrap().eq("b")),
            )
            .order_by(records.col("id").unwrap(), false)
            .limit(5);

        let stmt = query.to_sql().unwrap();
        assert!(stmt.sql.contains(
            r#"INNER JOIN "users" ON ("records"."user_id" = "users"."id")"#
        ));
        assert!(stmt
            .sql
            .contains(r#"WHERE (("users"."name" = ?) OR ("users"."name" = ?))"#));
        assert!(stmt.sql.ends_with(r#"ORDER BY "records"."id" DESC LIMIT 5"#));
        assert_eq!(stmt.params, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_selected_vs_referenced_tables() {
        let users = users();
        let records = records();
        let query = records
            .select()
            .join(&users, records.col("user_id").unwrap().eq_col(&users.col("id").unwrap()));

        assert_eq!(query.selected_tables().into_iter().collect::<Vec<_>>(), vec!["records"]);
        assert_eq!(
            query.referenced_tables().into_iter().collect::<Vec<_>>(),
            vec!["records", "users"]
        );
    }

    #[test]
    fn test_output_schema_uses_aliases() {
        let users = users();
        let query = SelectQuery::new()
            .column_as(users.col("id").unwrap(), "user_id")
            .literal(1i64, DataType::Int64, "one");

        let schema = query.output_schema();
        assert_eq!(schema.field(0).unwrap().name(), "user_id");
        assert_eq!(schema.field(1).unwrap().name(), "one");
        assert_eq!(query.from_table(), Some("users"));
    }

    #[test]
    fn test_unknown_column() {
        let err = users().col("email").unwrap_err();
        assert!(matches!(err, CacheError::ColumnNotFound(ref c) if c == "users.email"));
    }

    #[test]
    fn test_empty_projection_cannot_render() {
        assert!(SelectQuery::new().to_sql().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_identifier_quoting() {
        let table = TableDef::new("odd\"name").column("c", DataType::Int64, false);
        let stmt = table.select().to_sql().unwrap();
        assert!(stmt.sql.contains(r#"FROM "odd""name""#));
    }
}
