//! FHIR search → parameterized SQL.
//!
//! A resource type publishes a [`SearchParamRegistry`] mapping public search
//! parameter names to a type and a SQL column expression. [`SearchCompiler`]
//! folds request parameters into a `WHERE` clause, binding every user value:
//!
//! - **reference**: exact match after dropping any `Type/` (or base URL) prefix
//! - **token**: exact match on the code; the system segment of `system|code`
//!   is not compared
//! - **string**: case-insensitive starts-with (`:exact` and `:contains` supported)
//!
//! Values separated by commas are OR-ed, repeated parameters are AND-ed.
//! Parameters missing from the registry (including result parameters such as
//! `_count`) are ignored rather than rejected.

mod clauses;
mod escape;

use clauses::{build_reference_clause, build_string_clause, build_token_clause, StringMatch};
use escape::split_unescaped;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchParamType {
    Reference,
    Token,
    String,
}

/// One searchable parameter of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParamConfig {
    pub name: &'static str,
    pub param_type: SearchParamType,
    /// SQL column or expression compared against the bound value. Static
    /// server configuration, never derived from a request.
    pub column: &'static str,
}

impl SearchParamConfig {
    pub const fn reference(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            param_type: SearchParamType::Reference,
            column,
        }
    }

    pub const fn token(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            param_type: SearchParamType::Token,
            column,
        }
    }

    pub const fn string(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            param_type: SearchParamType::String,
            column,
        }
    }
}

/// Read-only set of search parameters for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct SearchParamRegistry {
    params: &'static [SearchParamConfig],
}

impl SearchParamRegistry {
    pub const fn new(params: &'static [SearchParamConfig]) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&SearchParamConfig> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchParamConfig> {
        self.params.iter()
    }
}

/// Value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(String),
    BigInt(i64),
}

/// SQL text plus its positional bind values (`$1` is `binds[0]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// Incrementally built search query over one table.
#[derive(Debug, Clone)]
pub struct SearchCompiler {
    table: String,
    select: String,
    order_by: String,
    conditions: Vec<String>,
    binds: Vec<BindValue>,
}

impl SearchCompiler {
    /// `order_by` must yield a total order so paging is reproducible.
    pub fn new(
        table: impl Into<String>,
        select: impl Into<String>,
        order_by: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            select: select.into(),
            order_by: order_by.into(),
            conditions: Vec::new(),
            binds: Vec::new(),
        }
    }

    /// Restrict to rows where `column` equals `value` (bound).
    pub fn filter_eq(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
        self.binds.push(BindValue::Text(value.into()));
        self.conditions
            .push(format!("{} = ${}", column, self.binds.len()));
        self
    }

    /// Add a fixed condition such as `deleted = false`.
    pub fn filter_static(&mut self, condition: &'static str) -> &mut Self {
        self.conditions.push(condition.to_string());
        self
    }

    /// Fold request parameters into the query.
    ///
    /// Returns the names of the parameters that were ignored.
    pub fn apply_params(
        &mut self,
        params: &[(String, String)],
        registry: &SearchParamRegistry,
    ) -> Vec<String> {
        let mut ignored = Vec::new();

        for (raw_name, raw_value) in params {
            let (name, modifier) = match raw_name.split_once(':') {
                Some((name, modifier)) => (name, Some(modifier)),
                None => (raw_name.as_str(), None),
            };

            let Some(param) = registry.get(name) else {
                ignored.push(raw_name.clone());
                continue;
            };

            let values = split_unescaped(raw_value, ',');
            let clause = match (param.param_type, modifier) {
                (SearchParamType::Token, None) => {
                    build_token_clause(param.column, &values, &mut self.binds)
                }
                (SearchParamType::Reference, None) => {
                    build_reference_clause(param.column, &values, &mut self.binds)
                }
                // `subject:Patient=123` narrows the target type; the column
                // already holds bare ids so the type is not compared.
                (SearchParamType::Reference, Some(m))
                    if m.starts_with(|c: char| c.is_ascii_uppercase()) =>
                {
                    build_reference_clause(param.column, &values, &mut self.binds)
                }
                (SearchParamType::String, None) => build_string_clause(
                    param.column,
                    &values,
                    StringMatch::StartsWith,
                    &mut self.binds,
                ),
                (SearchParamType::String, Some("contains")) => build_string_clause(
                    param.column,
                    &values,
                    StringMatch::Contains,
                    &mut self.binds,
                ),
                (SearchParamType::String, Some("exact")) => build_string_clause(
                    param.column,
                    &values,
                    StringMatch::Exact,
                    &mut self.binds,
                ),
                _ => {
                    ignored.push(raw_name.clone());
                    continue;
                }
            };

            if let Some(clause) = clause {
                self.conditions.push(clause);
            }
        }

        if !ignored.is_empty() {
            tracing::debug!(ignored = ?ignored, "Ignoring unsupported search parameters");
        }

        ignored
    }

    /// `SELECT COUNT(*)` over the current filters.
    pub fn count_sql(&self) -> CompiledQuery {
        CompiledQuery {
            sql: format!("SELECT COUNT(*) FROM {}{}", self.table, self.where_clause()),
            binds: self.binds.clone(),
        }
    }

    /// One page of rows in stable order. `limit`/`offset` are bound too.
    pub fn data_sql(&self, limit: i64, offset: i64) -> CompiledQuery {
        let mut binds = self.binds.clone();
        binds.push(BindValue::BigInt(limit));
        let limit_idx = binds.len();
        binds.push(BindValue::BigInt(offset));
        let offset_idx = binds.len();

        CompiledQuery {
            sql: format!(
                "SELECT {} FROM {}{} ORDER BY {} LIMIT ${} OFFSET ${}",
                self.select,
                self.table,
                self.where_clause(),
                self.order_by,
                limit_idx,
                offset_idx
            ),
            binds,
        }
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}
