//! Canonical Snapshot Model
//!
//! Engine-independent description of a database's structure.
//! Every entity here is a plain value; snapshots are rebuilt, never patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Complete structural snapshot at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub engine: EngineInfo,
    #[serde(default)]
    pub filters: CaptureFilters,
    #[serde(default)]
    pub enums: Vec<EnumType>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDef>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub checksum: String,
}

impl Snapshot {
    /// Find a table by its (schema, name) key
    pub fn table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    /// Produce a new snapshot carrying a fresh interface mapping.
    ///
    /// Mapping-related warnings from earlier passes are dropped so repeated
    /// mapping does not accumulate duplicates. Other warnings keep their order.
    pub fn with_interfaces(&self, mapping: InterfaceMapping) -> Snapshot {
        let mut warnings: Vec<Warning> = self
            .warnings
            .iter()
            .filter(|w| !w.kind.is_mapping_related())
            .cloned()
            .collect();
        warnings.extend(mapping.warnings);

        Snapshot {
            interfaces: mapping.interfaces,
            warnings,
            ..self.clone()
        }
    }

    /// Compute checksum from structural content.
    ///
    /// Interfaces and warnings are excluded: remapping must not change it.
    pub fn compute_checksum(
        tables: &[Table],
        indexes: &[Index],
        enums: &[EnumType],
        views: &[View],
    ) -> String {
        let mut hasher = Sha256::new();

        for table in tables {
            hasher.update(format!("T:{}", table.key()).as_bytes());
            for col in &table.columns {
                hasher.update(
                    format!(
                        "C:{}:{}:{}:{}",
                        col.name,
                        col.data_type,
                        col.nullable,
                        col.default_value.as_deref().unwrap_or("")
                    )
                    .as_bytes(),
                );
            }
            if let Some(pk) = &table.primary_key {
                hasher.update(format!("PK:{}:{}", pk.name, pk.columns.join(",")).as_bytes());
            }
            for uq in &table.unique_constraints {
                hasher.update(format!("UQ:{}:{}", uq.name, uq.columns.join(",")).as_bytes());
            }
            for ck in &table.check_constraints {
                hasher.update(format!("CK:{}:{}", ck.name, ck.expression).as_bytes());
            }
            for fk in &table.foreign_keys {
                hasher.update(
                    format!(
                        "FK:{}:{}->{}.{}:{}",
                        fk.name,
                        fk.columns.join(","),
                        fk.referenced_schema,
                        fk.referenced_table,
                        fk.referenced_columns.join(",")
                    )
                    .as_bytes(),
                );
            }
        }

        for idx in indexes {
            hasher.update(format!("I:{}:{}", idx.key(), idx.columns.join(",")).as_bytes());
        }
        for e in enums {
            hasher.update(format!("E:{}:{}", e.key(), e.values.join(",")).as_bytes());
        }
        for v in views {
            hasher.update(format!("V:{}:{}", v.key(), v.definition).as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

/// Identity of the engine a snapshot was captured from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub kind: EngineKind,
    pub version: String,
    pub host: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgres,
    Mysql,
    Sqlite,
}

/// Filters applied when the snapshot was captured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFilters {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl CaptureFilters {
    /// Whether a table with this key survives the filters
    pub fn admits(&self, schema: &str, table: &str) -> bool {
        let schema_ok = self.schemas.is_empty() || self.schemas.iter().any(|s| s == schema);
        schema_ok && !self.exclude_tables.iter().any(|t| t == table)
    }
}

/// Table representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_estimate: Option<i64>,
    pub columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<KeyConstraint>,
    #[serde(default)]
    pub unique_constraints: Vec<KeyConstraint>,
    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Stable "schema.name" key
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Primary key or unique constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

impl KeyConstraint {
    /// Case-sensitive joined key of the column list, order included
    pub fn joined(&self) -> String {
        join_columns(&self.columns)
    }
}

/// Joins column names into the comparison key used for cardinality checks.
pub fn join_columns(columns: &[String]) -> String {
    columns.join("\u{1f}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
}

/// Foreign key declared on the referencing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

/// ON UPDATE / ON DELETE behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ReferentialAction {
    /// Parse a catalog action; accepts spelled-out and single-letter codes.
    /// Unrecognised input is reported as unknown (`None`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" | "A" => Some(Self::NoAction),
            "RESTRICT" | "R" => Some(Self::Restrict),
            "CASCADE" | "C" => Some(Self::Cascade),
            "SET NULL" | "N" => Some(Self::SetNull),
            "SET DEFAULT" | "D" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        };
        f.write_str(s)
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// One side of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
}

/// Logical relationship derived from a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    pub cardinality: Cardinality,
    pub from: Endpoint,
    pub to: Endpoint,
    pub foreign_key: String,
}

/// Index representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub method: String,
    pub definition: String,
}

impl Index {
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.name)
    }
}

/// Enumerated type with its labels in native order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl EnumType {
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub schema: String,
    pub name: String,
    pub definition: String,
    pub columns: Vec<ViewColumn>,
}

impl View {
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewColumn {
    pub name: String,
    pub data_type: String,
}

/// Field-list declaration extracted from source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDef {
    pub name: String,
    /// "relative/path.ts:line"
    pub source: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_to: Option<MappedTo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_text: String,
    pub nullable: bool,
}

/// Result of mapping one interface onto one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedTo {
    pub schema: String,
    pub table: String,
    pub confidence: f64,
    pub diff: FieldDiff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub missing_in_table: Vec<String>,
    pub extra_in_table: Vec<String>,
    pub nullable_mismatches: Vec<String>,
    pub type_mismatches: Vec<String>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_in_table.is_empty()
            && self.extra_in_table.is_empty()
            && self.nullable_mismatches.is_empty()
            && self.type_mismatches.is_empty()
    }
}

/// Output of a mapping pass, merged into a snapshot by `Snapshot::with_interfaces`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceMapping {
    pub interfaces: Vec<InterfaceDef>,
    pub warnings: Vec<Warning>,
}

/// Advisory note attached to a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InterfaceUnmapped,
    InterfaceFieldMismatch,
    InterfaceAmbiguousMatch,
}

impl WarningKind {
    pub fn is_mapping_related(self) -> bool {
        matches!(
            self,
            Self::InterfaceUnmapped | Self::InterfaceFieldMismatch | Self::InterfaceAmbiguousMatch
        )
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InterfaceUnmapped => "interface unmapped",
            Self::InterfaceFieldMismatch => "interface field mismatch",
            Self::InterfaceAmbiguousMatch => "interface ambiguous match",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users_table() -> Table {
        Table {
            schema: "public".to_string(),
            name: "users".to_string(),
            comment: None,
            row_estimate: None,
            columns: vec![Column {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                default_value: None,
                is_primary_key: true,
                is_unique: false,
                is_generated: false,
                comment: None,
            }],
            primary_key: None,
            unique_constraints: vec![],
            check_constraints: vec![],
            foreign_keys: vec![],
        }
    }

    fn empty_snapshot() -> Snapshot {
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
            tables: vec![users_table()],
            views: vec![],
            relationships: vec![],
            indexes: vec![],
            interfaces: vec![],
            warnings: vec![],
            checksum: String::new(),
        }
    }

    #[test]
    fn test_checksum_consistency() {
        let tables = vec![users_table()];
        let checksum1 = Snapshot::compute_checksum(&tables, &[], &[], &[]);
        let checksum2 = Snapshot::compute_checksum(&tables, &[], &[], &[]);
        assert_eq!(checksum1, checksum2);

        let mut changed = users_table();
        changed.columns[0].nullable = true;
        let checksum3 = Snapshot::compute_checksum(&[changed], &[], &[], &[]);
        assert_ne!(checksum1, checksum3);
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::parse("set null"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("a"), Some(ReferentialAction::NoAction));
        assert_eq!(ReferentialAction::parse("whatever"), None);
        assert_eq!(ReferentialAction::SetDefault.to_string(), "SET DEFAULT");
    }

    #[test]
    fn test_capture_filters_admit() {
        let filters = CaptureFilters {
            schemas: vec!["public".to_string()],
            exclude_tables: vec!["_migrations".to_string()],
        };
        assert!(filters.admits("public", "users"));
        assert!(!filters.admits("audit", "users"));
        assert!(!filters.admits("public", "_migrations"));
        assert!(CaptureFilters::default().admits("any", "thing"));
    }

    #[test]
    fn test_with_interfaces_replaces_only_mapping_warnings() {
        let mut snapshot = empty_snapshot();
        snapshot.warnings = vec![Warning {
            kind: WarningKind::InterfaceUnmapped,
            message: "stale".to_string(),
            source: Some("a.ts:1".to_string()),
        }];

        let mapping = InterfaceMapping {
            interfaces: vec![],
            warnings: vec![Warning {
                kind: WarningKind::InterfaceFieldMismatch,
                message: "fresh".to_string(),
                source: None,
            }],
        };

        let remapped = snapshot.with_interfaces(mapping);
        assert_eq!(remapped.warnings.len(), 1);
        assert_eq!(remapped.warnings[0].message, "fresh");
        assert_eq!(remapped.tables, snapshot.tables);
        assert_eq!(remapped.id, snapshot.id);
        // the source value is untouched
        assert_eq!(snapshot.warnings[0].message, "stale");
    }

    #[test]
    fn test_interface_serializes_type_field() {
        let field = Field {
            name: "id".to_string(),
            type_text: "string".to_string(),
            nullable: false,
        };
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "string");
    }
}
