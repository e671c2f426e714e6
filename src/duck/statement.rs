// src/duck/statement.rs

use std::collections::HashMap;

use super::quote_ident;
use crate::config::TargetRelation;
use crate::process::{Column, ColumnType};

/// Multi-row `INSERT … ON CONFLICT … DO UPDATE` template.
///
/// Every value, including the modification timestamp, is a bound text
/// parameter cast straight to the relation's own column type, so numeric
/// strings reach `DECIMAL` or `VARCHAR` columns digit for digit. The SQL text
/// only depends on the column layout and the number of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatement {
    head: String,
    row: String,
    tail: String,
    params_per_row: usize,
}

impl UpsertStatement {
    pub fn new(
        target: &TargetRelation,
        columns: &[Column],
        relation_types: &HashMap<String, String>,
        primary_key: &[String],
        update_columns: &[String],
        modified_column: &str,
    ) -> Self {
        let mut names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
        names.push(quote_ident(modified_column));

        // keys of `relation_types` are lowercased column names
        let cast_to = |name: &str, declared: ColumnType| {
            relation_types
                .get(&name.to_lowercase())
                .map(String::as_str)
                .unwrap_or(declared.sql_type())
                .to_string()
        };
        let mut placeholders: Vec<String> = columns
            .iter()
            .map(|c| format!("CAST(? AS {})", cast_to(&c.name, c.ty)))
            .collect();
        placeholders.push(format!(
            "CAST(? AS {})",
            cast_to(modified_column, ColumnType::Timestamp)
        ));

        let head = format!(
            "INSERT INTO {}.{} ({}) VALUES ",
            quote_ident(&target.namespace),
            quote_ident(&target.table),
            names.join(", ")
        );
        let row = format!("({})", placeholders.join(", "));

        let key: Vec<String> = primary_key.iter().map(|k| quote_ident(k)).collect();
        let assignments: Vec<String> = update_columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(modified_column))
            .map(|c| {
                let q = quote_ident(c);
                format!("{q} = excluded.{q}")
            })
            .collect();
        let tail = format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            key.join(", "),
            assignments.join(", ")
        );

        Self {
            head,
            row,
            tail,
            params_per_row: columns.len() + 1,
        }
    }

    /// SQL for a batch of `rows` rows.
    pub fn sql(&self, rows: usize) -> String {
        let mut sql = String::with_capacity(self.head.len() + rows * (self.row.len() + 2) + self.tail.len());
        sql.push_str(&self.head);
        for i in 0..rows {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.row);
        }
        sql.push_str(&self.tail);
        sql
    }

    pub fn params_per_row(&self) -> usize {
        self.params_per_row
    }
}
