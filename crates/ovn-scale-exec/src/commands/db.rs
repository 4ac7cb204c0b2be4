//! Generic database commands shared by the `*-ctl` tools.

use super::{quote, Command};

/// A value written to a database column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbValue {
    /// `true` / `false`.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String; the empty string renders as `""`.
    Str(String),
    /// Set or list; renders comma-joined, or `[]` when empty.
    List(Vec<DbValue>),
    /// Map; renders one `column:key=value` argument per entry.
    Map(Vec<(String, DbValue)>),
}

impl DbValue {
    /// Render a scalar value.
    fn render(&self) -> String {
        match self {
            Self::Bool(true) => "true".to_string(),
            Self::Bool(false) => "false".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) if s.is_empty() => r#""""#.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(items) if items.is_empty() => "[]".to_string(),
            Self::List(items) => items
                .iter()
                .map(DbValue::render)
                .collect::<Vec<_>>()
                .join(","),
            Self::Map(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k}={}", v.render()))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<bool> for DbValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for DbValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for DbValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for DbValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for DbValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// `column<op>value` condition or assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValue {
    column: String,
    op: String,
    value: DbValue,
}

impl ColumnValue {
    /// `column=value`.
    pub fn eq(column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::with_op(column, "=", value)
    }

    /// `column<op>value`, e.g. `!=` or `>=` for `find`/`wait-until`.
    pub fn with_op(
        column: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<DbValue>,
    ) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    /// Map column entry, `column:key=value`.
    pub fn map_entry(
        column: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<DbValue>,
    ) -> Self {
        Self::eq(column, DbValue::Map(vec![(key.into(), value.into())]))
    }

    fn render_into(&self, out: &mut Vec<String>) {
        match &self.value {
            DbValue::Map(entries) => {
                for (key, value) in entries {
                    out.push(format!(
                        "{}:{key}{}{}",
                        self.column,
                        self.op,
                        value.render()
                    ));
                }
            }
            value => out.push(format!("{}{}{}", self.column, self.op, value.render())),
        }
    }
}

/// Render column values as command arguments.
pub fn column_args(values: &[ColumnValue]) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        value.render_into(&mut out);
    }
    out
}

/// `get <table> <record> <column>...`
pub fn get(table: &str, record: &str, columns: &[&str]) -> Command {
    Command::new("get")
        .args([table, record])
        .args(columns.iter().copied())
}

/// `set <table> <record> <column=value>...`
pub fn set(table: &str, record: &str, values: &[ColumnValue]) -> Command {
    Command::new("set")
        .args([table, record])
        .args(column_args(values))
}

/// `list <table> [<record>...]`
pub fn list(table: &str, records: &[&str]) -> Command {
    Command::new("list")
        .arg(table)
        .args(records.iter().copied())
}

/// `create <table> <column=value>...`; prints the new row's UUID.
pub fn create(table: &str, values: &[ColumnValue]) -> Command {
    Command::new("create")
        .arg(table)
        .args(column_args(values).iter().map(|arg| quote(arg)))
}

/// `add <table> <record> <column> <value>...`, adding to a set column.
pub fn add(table: &str, record: &str, column: &str, values: &[DbValue]) -> Command {
    Command::new("add")
        .args([table, record, column])
        .args(values.iter().map(|v| quote(&v.render())))
}

/// `remove <table> <record> <column> <value>...`, removing from a set column.
pub fn remove(table: &str, record: &str, column: &str, values: &[DbValue]) -> Command {
    Command::new("remove")
        .args([table, record, column])
        .args(values.iter().map(|v| quote(&v.render())))
}

/// `--if-exists destroy <table> <record>`
pub fn destroy(table: &str, record: &str) -> Command {
    Command::new("destroy").opt("--if-exists").args([table, record])
}

/// OVSDB string literal, for values that would not parse as bare words
/// (addresses, names starting with a digit).
pub fn literal(s: &str) -> DbValue {
    DbValue::Str(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
}

/// Parse a set column printed by `get`, e.g. `["10.0.0.1", "10.0.0.2"]` or a
/// single bare value.
pub fn parse_set(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches('"'))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `--bare --columns=<columns> find <table> <condition>...`
pub fn find(table: &str, columns: &[&str], conditions: &[ColumnValue]) -> Command {
    let mut cmd = Command::new("find")
        .arg(table)
        .args(column_args(conditions))
        .global("--bare");
    if !columns.is_empty() {
        cmd = cmd.global(format!("--columns={}", columns.join(",")));
    }
    cmd
}

/// `wait-until <table> <record> <condition>...`
pub fn wait_until(table: &str, record: &str, conditions: &[ColumnValue]) -> Command {
    Command::new("wait-until")
        .args([table, record])
        .args(column_args(conditions))
}
