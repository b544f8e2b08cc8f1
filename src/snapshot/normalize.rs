//! Snapshot Normalizer
//!
//! Assembles flat catalog rows into the nested snapshot model. Tables are
//! filtered first; any row pointing at a table that did not survive is
//! dropped. Column key flags are derived in one pass once every constraint
//! is attached, so row arrival order never matters.

use crate::catalog::{CatalogRows, ForeignKeyColumnRow, KeyColumnRow};
use crate::model::{
    CaptureFilters, CheckConstraint, Column, EnumType, ForeignKey, Index, KeyConstraint,
    ReferentialAction, Snapshot, Table, View, ViewColumn,
};
use crate::snapshot::relationships;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Generic marker engines report for enum/domain/composite columns
pub const USER_DEFINED_TYPE: &str = "USER-DEFINED";

/// Row sets that contradict the snapshot invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("duplicate table {schema}.{table} in catalog rows")]
    DuplicateTable { schema: String, table: String },

    #[error("duplicate column {column} in table {schema}.{table}")]
    DuplicateColumn {
        schema: String,
        table: String,
        column: String,
    },

    #[error("table {schema}.{table} has more than one primary key ({first}, {second})")]
    MultiplePrimaryKeys {
        schema: String,
        table: String,
        first: String,
        second: String,
    },

    #[error("duplicate view {schema}.{view} in catalog rows")]
    DuplicateView { schema: String, view: String },
}

type TableKey = (String, String);

/// Builds snapshots from catalog rows
pub struct Normalizer;

impl Normalizer {
    /// Normalize rows into a fresh snapshot stamped with a new id and the current time
    pub fn normalize(rows: CatalogRows, filters: &CaptureFilters) -> Result<Snapshot, NormalizeError> {
        Self::normalize_with(rows, filters, Uuid::new_v4(), Utc::now())
    }

    /// Normalize with an explicit identity and timestamp
    pub fn normalize_with(
        rows: CatalogRows,
        filters: &CaptureFilters,
        id: Uuid,
        generated_at: DateTime<Utc>,
    ) -> Result<Snapshot, NormalizeError> {
        let CatalogRows {
            engine,
            tables: table_rows,
            columns,
            primary_keys,
            unique_constraints,
            check_constraints,
            foreign_keys,
            indexes,
            enum_labels,
            views,
            view_columns,
        } = rows;

        let mut tables: Vec<Table> = Vec::new();
        let mut positions: HashMap<TableKey, usize> = HashMap::new();
        let mut seen_tables: HashSet<TableKey> = HashSet::new();
        let mut excluded = 0usize;

        for row in table_rows {
            // duplicates are fatal whether or not the filters keep the table
            if !seen_tables.insert((row.schema.clone(), row.name.clone())) {
                return Err(NormalizeError::DuplicateTable {
                    schema: row.schema,
                    table: row.name,
                });
            }
            if !filters.admits(&row.schema, &row.name) {
                excluded += 1;
                continue;
            }
            positions.insert((row.schema.clone(), row.name.clone()), tables.len());
            tables.push(Table {
                schema: row.schema,
                name: row.name,
                comment: row.comment,
                row_estimate: row.row_estimate,
                columns: Vec::new(),
                primary_key: None,
                unique_constraints: Vec::new(),
                check_constraints: Vec::new(),
                foreign_keys: Vec::new(),
            });
        }

        let mut ignored = 0usize;
        let position = |schema: &str, table: &str| -> Option<usize> {
            positions.get(&(schema.to_string(), table.to_string())).copied()
        };

        // Columns, ordered by ordinal within each table
        let mut ordered_columns: Vec<Vec<(i32, Column)>> = vec![Vec::new(); tables.len()];
        let mut seen_columns: HashSet<(usize, String)> = HashSet::new();
        for row in columns {
            let Some(pos) = position(&row.schema, &row.table) else {
                ignored += 1;
                continue;
            };
            if !seen_columns.insert((pos, row.name.clone())) {
                return Err(NormalizeError::DuplicateColumn {
                    schema: row.schema,
                    table: row.table,
                    column: row.name,
                });
            }
            let data_type = normalize_type(&row.data_type, row.udt_name.as_deref());
            ordered_columns[pos].push((
                row.ordinal,
                Column {
                    name: row.name,
                    data_type,
                    nullable: row.nullable,
                    default_value: row.default_value,
                    is_primary_key: false,
                    is_unique: false,
                    is_generated: row.is_generated,
                    comment: row.comment,
                },
            ));
        }
        for (table, mut cols) in tables.iter_mut().zip(ordered_columns) {
            cols.sort_by_key(|(ordinal, _)| *ordinal);
            table.columns = cols.into_iter().map(|(_, c)| c).collect();
        }

        // Primary keys
        for ((schema, table), constraint) in group_key_columns(primary_keys) {
            let Some(pos) = position(&schema, &table) else {
                ignored += 1;
                continue;
            };
            let target = &mut tables[pos];
            if let Some(existing) = &target.primary_key {
                return Err(NormalizeError::MultiplePrimaryKeys {
                    schema,
                    table,
                    first: existing.name.clone(),
                    second: constraint.name,
                });
            }
            target.primary_key = Some(constraint);
        }

        // Unique constraints
        for ((schema, table), constraint) in group_key_columns(unique_constraints) {
            match position(&schema, &table) {
                Some(pos) => tables[pos].unique_constraints.push(constraint),
                None => ignored += 1,
            }
        }

        // Check constraints
        for row in check_constraints {
            match position(&row.schema, &row.table) {
                Some(pos) => tables[pos].check_constraints.push(CheckConstraint {
                    name: row.constraint,
                    expression: row.expression,
                }),
                None => ignored += 1,
            }
        }

        // Foreign keys
        for ((schema, table), fk) in group_foreign_keys(foreign_keys) {
            match position(&schema, &table) {
                Some(pos) => tables[pos].foreign_keys.push(fk),
                None => ignored += 1,
            }
        }

        for table in &mut tables {
            derive_column_flags(table);
        }

        // Indexes
        let mut index_groups: Vec<(Index, Vec<(i32, String)>)> = Vec::new();
        let mut index_positions: HashMap<(String, String, String), usize> = HashMap::new();
        for row in indexes {
            if position(&row.schema, &row.table).is_none() {
                ignored += 1;
                continue;
            }
            let key = (row.schema.clone(), row.table.clone(), row.index.clone());
            let slot = match index_positions.get(&key) {
                Some(slot) => *slot,
                None => {
                    index_positions.insert(key, index_groups.len());
                    index_groups.push((
                        Index {
                            schema: row.schema,
                            table: row.table,
                            name: row.index,
                            columns: Vec::new(),
                            is_unique: row.is_unique,
                            is_primary: row.is_primary,
                            method: row.method,
                            definition: row.definition,
                        },
                        Vec::new(),
                    ));
                    index_groups.len() - 1
                }
            };
            index_groups[slot].1.push((row.ordinal, row.column));
        }
        let indexes: Vec<Index> = index_groups
            .into_iter()
            .map(|(mut index, mut cols)| {
                cols.sort_by_key(|(ordinal, _)| *ordinal);
                index.columns = cols.into_iter().map(|(_, c)| c).collect();
                index
            })
            .collect();

        // Enums
        let mut enum_groups: Vec<(EnumType, Vec<(f64, String)>)> = Vec::new();
        let mut enum_positions: HashMap<TableKey, usize> = HashMap::new();
        for row in enum_labels {
            let key = (row.schema.clone(), row.type_name.clone());
            let slot = match enum_positions.get(&key) {
                Some(slot) => *slot,
                None => {
                    enum_positions.insert(key, enum_groups.len());
                    enum_groups.push((
                        EnumType {
                            schema: row.schema,
                            name: row.type_name,
                            values: Vec::new(),
                            comment: None,
                        },
                        Vec::new(),
                    ));
                    enum_groups.len() - 1
                }
            };
            let group = &mut enum_groups[slot];
            if group.0.comment.is_none() {
                group.0.comment = row.comment;
            }
            group.1.push((row.sort_order, row.label));
        }
        let enums: Vec<EnumType> = enum_groups
            .into_iter()
            .map(|(mut enum_type, mut labels)| {
                labels.sort_by(|a, b| a.0.total_cmp(&b.0));
                let mut seen = HashSet::new();
                enum_type.values = labels
                    .into_iter()
                    .map(|(_, label)| label)
                    .filter(|label| seen.insert(label.clone()))
                    .collect();
                enum_type
            })
            .collect();

        // Views
        let mut view_list: Vec<View> = Vec::new();
        let mut view_positions: HashMap<TableKey, usize> = HashMap::new();
        for row in views {
            let key = (row.schema.clone(), row.name.clone());
            if view_positions.contains_key(&key) {
                return Err(NormalizeError::DuplicateView {
                    schema: row.schema,
                    view: row.name,
                });
            }
            view_positions.insert(key, view_list.len());
            view_list.push(View {
                schema: row.schema,
                name: row.name,
                definition: row.definition,
                columns: Vec::new(),
            });
        }
        let mut view_cols: Vec<Vec<(i32, ViewColumn)>> = vec![Vec::new(); view_list.len()];
        for row in view_columns {
            match view_positions.get(&(row.schema.clone(), row.view.clone())) {
                Some(pos) => view_cols[*pos].push((
                    row.ordinal,
                    ViewColumn {
                        name: row.name,
                        data_type: row.data_type,
                    },
                )),
                None => ignored += 1,
            }
        }
        for (view, mut cols) in view_list.iter_mut().zip(view_cols) {
            cols.sort_by_key(|(ordinal, _)| *ordinal);
            view.columns = cols.into_iter().map(|(_, c)| c).collect();
        }

        if excluded > 0 || ignored > 0 {
            debug!(
                "Normalizer dropped {} excluded tables and {} rows for unknown keys",
                excluded, ignored
            );
        }

        let relationships = relationships::derive(&tables);
        let checksum = Snapshot::compute_checksum(&tables, &indexes, &enums, &view_list);

        Ok(Snapshot {
            id,
            generated_at,
            engine,
            filters: filters.clone(),
            enums,
            tables,
            views: view_list,
            relationships,
            indexes,
            interfaces: Vec::new(),
            warnings: Vec::new(),
            checksum,
        })
    }
}

/// Resolve the engine's generic user-defined marker to the underlying type name
pub fn normalize_type(data_type: &str, udt_name: Option<&str>) -> String {
    match udt_name {
        Some(udt) if data_type == USER_DEFINED_TYPE && !udt.is_empty() => udt.to_string(),
        _ => data_type.to_string(),
    }
}

/// Recompute `is_primary_key` / `is_unique` from the attached constraints
pub fn derive_column_flags(table: &mut Table) {
    let pk_columns: HashSet<&str> = table
        .primary_key
        .iter()
        .flat_map(|pk| pk.columns.iter().map(String::as_str))
        .collect();
    let unique_columns: HashSet<&str> = table
        .unique_constraints
        .iter()
        .flat_map(|uq| uq.columns.iter().map(String::as_str))
        .collect();

    let flags: Vec<(bool, bool)> = table
        .columns
        .iter()
        .map(|c| {
            (
                pk_columns.contains(c.name.as_str()),
                unique_columns.contains(c.name.as_str()),
            )
        })
        .collect();

    for (column, (is_pk, is_unique)) in table.columns.iter_mut().zip(flags) {
        column.is_primary_key = is_pk;
        column.is_unique = is_unique;
    }
}

/// Group constraint-column rows into constraints, first-appearance order
fn group_key_columns(rows: Vec<KeyColumnRow>) -> Vec<(TableKey, KeyConstraint)> {
    let mut groups: Vec<(TableKey, String, Vec<(i32, String)>)> = Vec::new();
    let mut slots: HashMap<(String, String, String), usize> = HashMap::new();

    for row in rows {
        let key = (row.schema.clone(), row.table.clone(), row.constraint.clone());
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(((row.schema.clone(), row.table.clone()), row.constraint.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].2.push((row.ordinal, row.column));
    }

    groups
        .into_iter()
        .map(|(table_key, name, mut cols)| {
            cols.sort_by_key(|(ordinal, _)| *ordinal);
            (
                table_key,
                KeyConstraint {
                    name,
                    columns: cols.into_iter().map(|(_, c)| c).collect(),
                },
            )
        })
        .collect()
}

/// Group per-column foreign key rows into foreign keys, first-appearance order
fn group_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Vec<(TableKey, ForeignKey)> {
    let mut groups: Vec<(TableKey, ForeignKey, Vec<(i32, String, String)>)> = Vec::new();
    let mut slots: HashMap<(String, String, String), usize> = HashMap::new();

    for row in rows {
        let key = (row.schema.clone(), row.table.clone(), row.constraint.clone());
        let slot = match slots.get(&key) {
            Some(slot) => *slot,
            None => {
                slots.insert(key, groups.len());
                groups.push((
                    (row.schema.clone(), row.table.clone()),
                    ForeignKey {
                        name: row.constraint.clone(),
                        columns: Vec::new(),
                        referenced_schema: row.referenced_schema.clone(),
                        referenced_table: row.referenced_table.clone(),
                        referenced_columns: Vec::new(),
                        on_update: row.on_update.as_deref().and_then(ReferentialAction::parse),
                        on_delete: row.on_delete.as_deref().and_then(ReferentialAction::parse),
                    },
                    Vec::new(),
                ));
                groups.len() - 1
            }
        };
        groups[slot].2.push((row.ordinal, row.column, row.referenced_column));
    }

    groups
        .into_iter()
        .map(|(table_key, mut fk, mut pairs)| {
            pairs.sort_by_key(|(ordinal, _, _)| *ordinal);
            for (_, column, referenced) in pairs {
                fk.columns.push(column);
                fk.referenced_columns.push(referenced);
            }
            (table_key, fk)
        })
        .collect()
}
