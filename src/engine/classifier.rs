//! Query classification and the destructive-operation gate.
//!
//! Classification is lexical/structural and happens before any backend call.
//! SQL text goes through sqlparser; statements the parser cannot handle fall
//! back to leading-keyword classification. Document queries are classified
//! from their structured form directly.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::engine::error::{FederationError, FederationResult};
use crate::engine::types::{DocumentOperation, DocumentQuery, Query, QueryOptions};

/// Safety class of a query. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueryClass {
    ReadOnly,
    Write,
    Destructive,
}

/// Classifies a query as read-only, write, or destructive.
pub fn classify(query: &Query) -> QueryClass {
    match query {
        Query::Sql(sql) => classify_sql(sql),
        Query::Document(dq) => classify_document(dq),
    }
}

/// Gate check: destructive operations require explicit opt-in.
///
/// Runs before any backend call and has no side effects of its own.
pub fn authorize(class: QueryClass, options: &QueryOptions) -> FederationResult<()> {
    if class == QueryClass::Destructive && !options.allow_destructive {
        return Err(FederationError::destructive_not_allowed());
    }
    Ok(())
}

fn classify_sql(sql: &str) -> QueryClass {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) if !statements.is_empty() => statements
            .iter()
            .map(classify_statement)
            .max()
            .unwrap_or(QueryClass::Write),
        _ => {
            debug!("statement did not parse, falling back to keyword classification");
            classify_keyword(sql)
        }
    }
}

fn classify_statement(statement: &Statement) -> QueryClass {
    match statement {
        Statement::Query(_) => QueryClass::ReadOnly,
        Statement::Insert(_) => QueryClass::Write,
        // An unrestricted delete-all is destructive; a scoped delete is a write.
        Statement::Delete(delete) => {
            if delete.selection.is_none() {
                QueryClass::Destructive
            } else {
                QueryClass::Write
            }
        }
        Statement::Drop { .. } | Statement::Truncate { .. } => QueryClass::Destructive,
        // UPDATE, ALTER, CREATE, EXPLAIN, SHOW, GRANT, ... — the rendered
        // statement starts with its defining keyword, which is all the
        // classification needs.
        other => classify_keyword(&other.to_string()),
    }
}

/// Leading-keyword classification, used for parse failures and for parsed
/// statements with no structural special-casing.
fn classify_keyword(sql: &str) -> QueryClass {
    let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "DESC" | "VALUES" | "TABLE" => {
            QueryClass::ReadOnly
        }
        "DROP" | "TRUNCATE" | "ALTER" => QueryClass::Destructive,
        "DELETE" => {
            if sql.to_ascii_uppercase().contains("WHERE") {
                QueryClass::Write
            } else {
                QueryClass::Destructive
            }
        }
        // INSERT, UPDATE, CREATE, GRANT, REVOKE, and anything unrecognized:
        // treated as a write — never cached, but not blocked either.
        _ => QueryClass::Write,
    }
}

fn classify_document(query: &DocumentQuery) -> QueryClass {
    match query.operation {
        DocumentOperation::Find => QueryClass::ReadOnly,
        // Deleting with an empty filter removes every document in the
        // collection.
        DocumentOperation::Delete => {
            if query.filters.is_empty() {
                QueryClass::Destructive
            } else {
                QueryClass::Write
            }
        }
    }
}
