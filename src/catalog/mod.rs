//! Catalog Rows
//!
//! Flat row shapes produced by per-engine catalog adapters and consumed by
//! the normalizer. Rows are denormalized: one per column, one per
//! constraint-column pair, one per index column, one per enum label.

pub mod postgres;

pub use postgres::PostgresCatalog;

use crate::error::AppError;
use crate::model::{CaptureFilters, EngineInfo};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub schema: String,
    pub name: String,
    pub comment: Option<String>,
    pub row_estimate: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    /// Declared type as reported by the engine, possibly a generic marker
    pub data_type: String,
    /// Underlying type name used when `data_type` is the user-defined marker
    pub udt_name: Option<String>,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_generated: bool,
    pub comment: Option<String>,
    pub ordinal: i32,
}

/// One column of a primary key or unique constraint
#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumnRow {
    pub schema: String,
    pub table: String,
    pub constraint: String,
    pub column: String,
    pub ordinal: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckRow {
    pub schema: String,
    pub table: String,
    pub constraint: String,
    pub expression: String,
}

/// One referencing/referenced column pair of a foreign key
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyColumnRow {
    pub schema: String,
    pub table: String,
    pub constraint: String,
    pub column: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub ordinal: i32,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexColumnRow {
    pub schema: String,
    pub table: String,
    pub index: String,
    pub column: String,
    pub ordinal: i32,
    pub is_unique: bool,
    pub is_primary: bool,
    pub method: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumLabelRow {
    pub schema: String,
    pub type_name: String,
    pub label: String,
    pub sort_order: f64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewColumnRow {
    pub schema: String,
    pub view: String,
    pub name: String,
    pub data_type: String,
    pub ordinal: i32,
}

/// Every row set from one consistent catalog read
#[derive(Debug, Clone)]
pub struct CatalogRows {
    pub engine: EngineInfo,
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub primary_keys: Vec<KeyColumnRow>,
    pub unique_constraints: Vec<KeyColumnRow>,
    pub check_constraints: Vec<CheckRow>,
    pub foreign_keys: Vec<ForeignKeyColumnRow>,
    pub indexes: Vec<IndexColumnRow>,
    pub enum_labels: Vec<EnumLabelRow>,
    pub views: Vec<ViewRow>,
    pub view_columns: Vec<ViewColumnRow>,
}

impl CatalogRows {
    /// Empty row sets for the given engine
    pub fn empty(engine: EngineInfo) -> Self {
        Self {
            engine,
            tables: Vec::new(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            enum_labels: Vec::new(),
            views: Vec::new(),
            view_columns: Vec::new(),
        }
    }
}

/// A per-engine source of catalog rows
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, filters: &CaptureFilters) -> Result<CatalogRows, AppError>;
}
