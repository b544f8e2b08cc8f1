//! Snapshot Diff Engine
//!
//! The "git diff" between two captured snapshots. Entity sets are compared by
//! identity key, columns of tables present on both sides are compared field by
//! field, and changes that break code written against the base are flagged.

use crate::model::{Column, Snapshot, Table};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Added / removed identity keys for one entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Column-level changes of a table present in both snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChanges {
    /// "schema.table"
    pub table: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

/// Summary entry: a table and every column touched in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedTable {
    pub table: String,
    pub columns: Vec<String>,
}

/// Complete diff result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub from_snapshot: Uuid,
    pub to_snapshot: Uuid,
    pub from_checksum: String,
    pub to_checksum: String,
    pub tables: EntityDiff,
    pub enums: EntityDiff,
    pub indexes: EntityDiff,
    pub relationships: EntityDiff,
    pub interfaces: EntityDiff,
    pub column_changes: Vec<ColumnChanges>,
    pub changed_tables: Vec<ChangedTable>,
    pub breaking: Vec<String>,
}

impl DiffReport {
    /// True when nothing at all differs
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.enums.is_empty()
            && self.indexes.is_empty()
            && self.relationships.is_empty()
            && self.interfaces.is_empty()
            && self.column_changes.is_empty()
            && self.breaking.is_empty()
    }

    pub fn has_breaking_changes(&self) -> bool {
        !self.breaking.is_empty()
    }
}

/// The diff engine that compares snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare base snapshot `from` with candidate `to`
    pub fn diff(from: &Snapshot, to: &Snapshot) -> DiffReport {
        let tables = Self::diff_keys(
            from.tables.iter().map(Table::key),
            to.tables.iter().map(Table::key),
        );
        let enums = Self::diff_keys(
            from.enums.iter().map(|e| e.key()),
            to.enums.iter().map(|e| e.key()),
        );
        let indexes = Self::diff_keys(
            from.indexes.iter().map(|i| i.key()),
            to.indexes.iter().map(|i| i.key()),
        );
        let relationships = Self::diff_keys(
            from.relationships.iter().map(|r| r.foreign_key.clone()),
            to.relationships.iter().map(|r| r.foreign_key.clone()),
        );
        let interfaces = Self::diff_keys(
            from.interfaces.iter().map(|i| i.name.to_lowercase()),
            to.interfaces.iter().map(|i| i.name.to_lowercase()),
        );

        let mut column_changes = Vec::new();
        let mut changed_tables = Vec::new();
        let mut breaking = Vec::new();

        for from_table in &from.tables {
            let Some(to_table) = to.table(&from_table.schema, &from_table.name) else {
                continue;
            };
            let key = from_table.key();
            if let Some(changes) = Self::diff_columns(&key, from_table, to_table, &mut breaking) {
                let mut touched = changes.added.clone();
                touched.extend(changes.removed.iter().cloned());
                touched.extend(changes.changed.iter().cloned());
                changed_tables.push(ChangedTable {
                    table: key,
                    columns: touched,
                });
                column_changes.push(changes);
            }
        }

        DiffReport {
            from_snapshot: from.id,
            to_snapshot: to.id,
            from_checksum: from.checksum.clone(),
            to_checksum: to.checksum.clone(),
            tables,
            enums,
            indexes,
            relationships,
            interfaces,
            column_changes,
            changed_tables,
            breaking,
        }
    }

    /// Set difference over identity keys; `added` keeps candidate order,
    /// `removed` keeps base order.
    fn diff_keys<A, B>(from: A, to: B) -> EntityDiff
    where
        A: Iterator<Item = String>,
        B: Iterator<Item = String>,
    {
        let from_keys: Vec<String> = from.collect();
        let to_keys: Vec<String> = to.collect();
        let from_set: HashSet<&str> = from_keys.iter().map(String::as_str).collect();
        let to_set: HashSet<&str> = to_keys.iter().map(String::as_str).collect();

        let mut seen = HashSet::new();
        let added = to_keys
            .iter()
            .filter(|k| !from_set.contains(k.as_str()) && seen.insert(k.as_str()))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let removed = from_keys
            .iter()
            .filter(|k| !to_set.contains(k.as_str()) && seen.insert(k.as_str()))
            .cloned()
            .collect();

        EntityDiff { added, removed }
    }

    fn diff_columns(
        table_path: &str,
        from_table: &Table,
        to_table: &Table,
        breaking: &mut Vec<String>,
    ) -> Option<ColumnChanges> {
        let from_cols: HashMap<&str, &Column> = from_table
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();
        let added: Vec<String> = to_table
            .columns
            .iter()
            .filter(|c| !from_cols.contains_key(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        let mut removed = Vec::new();
        let mut changed = Vec::new();

        for from_col in &from_table.columns {
            let path = format!("{}.{}", table_path, from_col.name);
            match to_table.column(&from_col.name) {
                None => {
                    breaking.push(format!("Column {} was removed", path));
                    removed.push(from_col.name.clone());
                }
                Some(to_col) => {
                    if Self::compare_columns(&path, from_col, to_col, breaking) {
                        changed.push(from_col.name.clone());
                    }
                }
            }
        }

        if added.is_empty() && removed.is_empty() && changed.is_empty() {
            return None;
        }

        Some(ColumnChanges {
            table: table_path.to_string(),
            added,
            removed,
            changed,
        })
    }

    /// Returns whether the column changed; records breaking changes on the way
    fn compare_columns(path: &str, from: &Column, to: &Column, breaking: &mut Vec<String>) -> bool {
        let mut modified = false;

        if from.data_type != to.data_type {
            modified = true;
            breaking.push(format!(
                "Column {} changed type from {} to {}",
                path, from.data_type, to.data_type
            ));
        }

        if from.nullable != to.nullable {
            modified = true;
            if from.nullable && !to.nullable {
                breaking.push(format!(
                    "Column {} changed from nullable to NOT NULL",
                    path
                ));
            }
        }

        let from_default = from.default_value.as_deref().unwrap_or("");
        let to_default = to.default_value.as_deref().unwrap_or("");
        if from_default != to_default {
            modified = true;
        }

        modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CaptureFilters, Cardinality, EngineInfo, EngineKind, EnumType, Endpoint, Index,
        InterfaceDef, Relationship,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn column(name: &str, data_type: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            default_value: None,
            is_primary_key: false,
            is_unique: false,
            is_generated: false,
            comment: None,
        }
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            schema: "public".to_string(),
            name: name.to_string(),
            comment: None,
            row_estimate: None,
            columns,
            primary_key: None,
            unique_constraints: vec![],
            check_constraints: vec![],
            foreign_keys: vec![],
        }
    }

    fn snapshot(tables: Vec<Table>) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            engine: EngineInfo {
                kind: EngineKind::Postgres,
                version: "16".to_string(),
                host: "localhost".to_string(),
                database: "app".to_string(),
            },
            filters: CaptureFilters::default(),
            enums: vec![],
            tables,
            views: vec![],
            relationships: vec![],
            indexes: vec![],
            interfaces: vec![],
            warnings: vec![],
            checksum: String::new(),
        }
    }

    fn rich_snapshot() -> Snapshot {
        let mut s = snapshot(vec![
            table("users", vec![column("id", "integer", false), column("email", "text", true)]),
            table("orders", vec![column("id", "integer", false)]),
        ]);
        s.enums = vec![EnumType {
            schema: "public".to_string(),
            name: "mood".to_string(),
            values: vec!["sad".to_string(), "happy".to_string()],
            comment: None,
        }];
        s.indexes = vec![Index {
            schema: "public".to_string(),
            table: "users".to_string(),
            name: "users_email_idx".to_string(),
            columns: vec!["email".to_string()],
            is_unique: true,
            is_primary: false,
            method: "btree".to_string(),
            definition: String::new(),
        }];
        s.relationships = vec![Relationship {
            name: "orders -> users".to_string(),
            cardinality: Cardinality::ManyToOne,
            from: Endpoint {
                schema: "public".to_string(),
                table: "orders".to_string(),
                columns: vec!["user_id".to_string()],
            },
            to: Endpoint {
                schema: "public".to_string(),
                table: "users".to_string(),
                columns: vec!["id".to_string()],
            },
            foreign_key: "orders_user_fk".to_string(),
        }];
        s.interfaces = vec![InterfaceDef {
            name: "UserDTO".to_string(),
            source: "src/user.ts:1".to_string(),
            fields: vec![],
            mapped_to: None,
        }];
        s
    }

    #[test]
    fn test_nullable_tightening_is_breaking() {
        let a = snapshot(vec![table("users", vec![column("email", "text", true)])]);
        let b = snapshot(vec![table("users", vec![column("email", "text", false)])]);

        let report = DiffEngine::diff(&a, &b);

        assert_eq!(
            report.column_changes,
            vec![ColumnChanges {
                table: "public.users".to_string(),
                added: vec![],
                removed: vec![],
                changed: vec!["email".to_string()],
            }]
        );
        assert_eq!(
            report.breaking,
            vec!["Column public.users.email changed from nullable to NOT NULL".to_string()]
        );
        assert_eq!(
            report.changed_tables,
            vec![ChangedTable {
                table: "public.users".to_string(),
                columns: vec!["email".to_string()],
            }]
        );
    }

    #[test]
    fn test_relaxing_to_nullable_is_not_breaking() {
        let a = snapshot(vec![table("users", vec![column("email", "text", false)])]);
        let b = snapshot(vec![table("users", vec![column("email", "text", true)])]);

        let report = DiffEngine::diff(&a, &b);
        assert_eq!(report.column_changes[0].changed, vec!["email".to_string()]);
        assert!(report.breaking.is_empty());
    }

    #[test]
    fn test_removed_and_retyped_columns_are_breaking() {
        let a = snapshot(vec![table(
            "users",
            vec![column("id", "integer", false), column("legacy", "text", true)],
        )]);
        let b = snapshot(vec![table(
            "users",
            vec![column("id", "bigint", false), column("nickname", "text", true)],
        )]);

        let report = DiffEngine::diff(&a, &b);

        let changes = &report.column_changes[0];
        assert_eq!(changes.added, vec!["nickname".to_string()]);
        assert_eq!(changes.removed, vec!["legacy".to_string()]);
        assert_eq!(changes.changed, vec!["id".to_string()]);
        assert_eq!(
            report.breaking,
            vec![
                "Column public.users.id changed type from integer to bigint".to_string(),
                "Column public.users.legacy was removed".to_string(),
            ]
        );
        assert_eq!(
            report.changed_tables[0].columns,
            vec!["nickname".to_string(), "legacy".to_string(), "id".to_string()]
        );
    }

    #[test]
    fn test_type_comparison_is_case_sensitive() {
        let a = snapshot(vec![table("users", vec![column("id", "integer", false)])]);
        let b = snapshot(vec![table("users", vec![column("id", "INTEGER", false)])]);

        let report = DiffEngine::diff(&a, &b);
        assert_eq!(report.breaking.len(), 1);
    }

    #[test]
    fn test_default_change_counts_absent_as_empty() {
        let mut with_empty_default = column("note", "text", true);
        with_empty_default.default_value = Some(String::new());
        let a = snapshot(vec![table("users", vec![column("note", "text", true)])]);
        let b = snapshot(vec![table("users", vec![with_empty_default])]);
        assert!(DiffEngine::diff(&a, &b).column_changes.is_empty());

        let mut with_default = column("note", "text", true);
        with_default.default_value = Some("'n/a'::text".to_string());
        let c = snapshot(vec![table("users", vec![with_default])]);
        let report = DiffEngine::diff(&a, &c);
        assert_eq!(report.column_changes[0].changed, vec!["note".to_string()]);
        assert!(report.breaking.is_empty());
    }

    #[test]
    fn test_additions_are_never_breaking() {
        let a = snapshot(vec![table("users", vec![column("id", "integer", false)])]);
        let b = snapshot(vec![
            table(
                "users",
                vec![column("id", "integer", false), column("age", "integer", false)],
            ),
            table("invoices", vec![column("id", "integer", false)]),
        ]);

        let report = DiffEngine::diff(&a, &b);
        assert_eq!(report.tables.added, vec!["public.invoices".to_string()]);
        assert_eq!(report.column_changes[0].added, vec!["age".to_string()]);
        assert!(report.breaking.is_empty());
    }

    #[test]
    fn test_diff_identity() {
        let a = rich_snapshot();
        let report = DiffEngine::diff(&a, &a);
        assert!(report.is_empty());
        assert!(report.changed_tables.is_empty());
        assert!(!report.has_breaking_changes());
    }

    #[test]
    fn test_diff_symmetry() {
        let a = rich_snapshot();
        let b = snapshot(vec![table("accounts", vec![column("id", "uuid", false)])]);

        let ab = DiffEngine::diff(&a, &b);
        let ba = DiffEngine::diff(&b, &a);

        assert_eq!(ab.tables.added, ba.tables.removed);
        assert_eq!(ab.tables.removed, ba.tables.added);
        assert_eq!(ab.enums.removed, vec!["public.mood".to_string()]);
        assert_eq!(ab.indexes.removed, vec!["public.users.users_email_idx".to_string()]);
        assert_eq!(ab.relationships.removed, vec!["orders_user_fk".to_string()]);
        assert_eq!(ab.interfaces.removed, vec!["userdto".to_string()]);
        assert_eq!(ba.interfaces.added, vec!["userdto".to_string()]);
        // no overlapping tables, so no column-level changes
        assert!(ab.column_changes.is_empty());
    }

    #[test]
    fn test_interface_keys_ignore_case() {
        let a = rich_snapshot();
        let mut b = rich_snapshot();
        b.interfaces[0].name = "userdto".to_string();
        assert!(DiffEngine::diff(&a, &b).interfaces.is_empty());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let a = rich_snapshot();
        let b = snapshot(vec![table("users", vec![column("id", "bigint", true)])]);
        assert_eq!(DiffEngine::diff(&a, &b), DiffEngine::diff(&a, &b));
    }
}
