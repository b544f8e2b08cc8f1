//! Interface Mapper
//!
//! Associates declared field lists with tables by case-insensitive name and
//! measures the structural drift between them. Mapping never fails: every
//! problem becomes a warning.

use crate::model::{
    Column, FieldDiff, InterfaceDef, InterfaceMapping, MappedTo, Table, Warning, WarningKind,
};
use tracing::debug;

/// Fixed score for any name match; not a similarity measure
pub const NAME_MATCH_CONFIDENCE: f64 = 0.9;

/// Map every interface onto the tables, in table order
pub fn map_interfaces(tables: &[Table], interfaces: &[InterfaceDef]) -> InterfaceMapping {
    let mut mapped = Vec::with_capacity(interfaces.len());
    let mut warnings = Vec::new();

    for interface in interfaces {
        let wanted = interface.name.to_lowercase();
        let candidates: Vec<&Table> = tables
            .iter()
            .filter(|t| t.name.to_lowercase() == wanted)
            .collect();

        let Some(table) = candidates.first().copied() else {
            warnings.push(Warning {
                kind: WarningKind::InterfaceUnmapped,
                message: format!("Interface {} has no matching table", interface.name),
                source: Some(interface.source.clone()),
            });
            mapped.push(InterfaceDef {
                mapped_to: None,
                ..interface.clone()
            });
            continue;
        };

        if candidates.len() > 1 {
            let names: Vec<String> = candidates.iter().map(|t| t.key()).collect();
            warnings.push(Warning {
                kind: WarningKind::InterfaceAmbiguousMatch,
                message: format!(
                    "Interface {} matches {} tables ({}); using {}",
                    interface.name,
                    candidates.len(),
                    names.join(", "),
                    table.key()
                ),
                source: Some(interface.source.clone()),
            });
        }

        let diff = diff_fields(interface, table);
        if !diff.is_empty() {
            warnings.push(Warning {
                kind: WarningKind::InterfaceFieldMismatch,
                message: mismatch_message(&interface.name, &table.key(), &diff),
                source: Some(interface.source.clone()),
            });
        }

        debug!("Mapped interface {} to {}", interface.name, table.key());

        mapped.push(InterfaceDef {
            mapped_to: Some(MappedTo {
                schema: table.schema.clone(),
                table: table.name.clone(),
                confidence: NAME_MATCH_CONFIDENCE,
                diff,
            }),
            ..interface.clone()
        });
    }

    InterfaceMapping {
        interfaces: mapped,
        warnings,
    }
}

/// Field-level comparison of one interface against one table
pub fn diff_fields(interface: &InterfaceDef, table: &Table) -> FieldDiff {
    let mut remaining: Vec<&Column> = table.columns.iter().collect();
    let mut diff = FieldDiff::default();

    for field in &interface.fields {
        let position = remaining
            .iter()
            .position(|c| c.name.to_lowercase() == field.name.to_lowercase());

        let Some(position) = position else {
            diff.missing_in_table.push(field.name.clone());
            continue;
        };
        let column = remaining.remove(position);

        if column.nullable != field.nullable {
            diff.nullable_mismatches.push(field.name.clone());
        }
        if column.data_type.to_lowercase() != field.type_text.to_lowercase() {
            diff.type_mismatches.push(field.name.clone());
        }
    }

    diff.extra_in_table = remaining.into_iter().map(|c| c.name.clone()).collect();
    diff
}

fn mismatch_message(interface: &str, table: &str, diff: &FieldDiff) -> String {
    let mut parts = Vec::new();
    if !diff.missing_in_table.is_empty() {
        parts.push(format!("missing in table: {}", diff.missing_in_table.join(", ")));
    }
    if !diff.extra_in_table.is_empty() {
        parts.push(format!("extra in table: {}", diff.extra_in_table.join(", ")));
    }
    if !diff.nullable_mismatches.is_empty() {
        parts.push(format!("nullability differs: {}", diff.nullable_mismatches.join(", ")));
    }
    if !diff.type_mismatches.is_empty() {
        parts.push(format!("type differs: {}", diff.type_mismatches.join(", ")));
    }
    format!("Interface {} differs from {} ({})", interface, table, parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
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

    fn table(schema: &str, name: &str, columns: Vec<Column>) -> Table {
        Table {
            schema: schema.to_string(),
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

    fn field(name: &str, type_text: &str, nullable: bool) -> Field {
        Field {
            name: name.to_string(),
            type_text: type_text.to_string(),
            nullable,
        }
    }

    fn interface(name: &str, fields: Vec<Field>) -> InterfaceDef {
        InterfaceDef {
            name: name.to_string(),
            source: format!("src/{}.ts:3", name.to_lowercase()),
            fields,
            mapped_to: None,
        }
    }

    fn users() -> Table {
        table(
            "public",
            "users",
            vec![column("id", "text", false), column("email", "text", true)],
        )
    }

    #[test]
    fn test_unmapped_interface_warns() {
        let mapping = map_interfaces(&[users()], &[interface("Widget", vec![])]);

        assert!(mapping.interfaces[0].mapped_to.is_none());
        assert_eq!(mapping.warnings.len(), 1);
        assert_eq!(mapping.warnings[0].kind, WarningKind::InterfaceUnmapped);
        assert_eq!(mapping.warnings[0].source.as_deref(), Some("src/widget.ts:3"));
    }

    #[test]
    fn test_field_mismatch_uses_textual_types() {
        let tables = vec![users()];
        let dto = InterfaceDef {
            name: "users".to_string(),
            ..interface(
                "UserDTO",
                vec![field("id", "string", false), field("age", "number", true)],
            )
        };

        let mapping = map_interfaces(&tables, &[dto]);
        let mapped = mapping.interfaces[0].mapped_to.as_ref().unwrap();

        assert_eq!(mapped.schema, "public");
        assert_eq!(mapped.table, "users");
        assert_eq!(mapped.confidence, NAME_MATCH_CONFIDENCE);
        assert_eq!(
            mapped.diff,
            FieldDiff {
                missing_in_table: vec!["age".to_string()],
                extra_in_table: vec!["email".to_string()],
                nullable_mismatches: vec![],
                // "string" vs "text" differ textually
                type_mismatches: vec!["id".to_string()],
            }
        );
        assert_eq!(mapping.warnings.len(), 1);
        assert_eq!(mapping.warnings[0].kind, WarningKind::InterfaceFieldMismatch);
    }

    #[test]
    fn test_name_and_type_compare_case_insensitively() {
        let tables = vec![table("public", "Accounts", vec![column("Id", "TEXT", false)])];
        let mapping = map_interfaces(&tables, &[interface("accounts", vec![field("id", "text", false)])]);

        let mapped = mapping.interfaces[0].mapped_to.as_ref().unwrap();
        assert!(mapped.diff.is_empty());
        assert!(mapping.warnings.is_empty());
    }

    #[test]
    fn test_nullable_mismatch() {
        let tables = vec![users()];
        let mapping = map_interfaces(
            &tables,
            &[interface(
                "users",
                vec![field("id", "text", false), field("email", "text", false)],
            )],
        );
        let diff = &mapping.interfaces[0].mapped_to.as_ref().unwrap().diff;
        assert_eq!(diff.nullable_mismatches, vec!["email".to_string()]);
        assert!(diff.type_mismatches.is_empty());
        assert!(diff.extra_in_table.is_empty());
    }

    #[test]
    fn test_first_table_wins_and_ambiguity_is_flagged() {
        let tables = vec![
            table("billing", "users", vec![column("id", "text", false)]),
            table("public", "users", vec![column("id", "text", false)]),
        ];
        let mapping = map_interfaces(&tables, &[interface("Users", vec![field("id", "text", false)])]);

        let mapped = mapping.interfaces[0].mapped_to.as_ref().unwrap();
        assert_eq!(mapped.schema, "billing");
        assert_eq!(mapping.warnings.len(), 1);
        assert_eq!(mapping.warnings[0].kind, WarningKind::InterfaceAmbiguousMatch);
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let tables = vec![users()];
        let interfaces = vec![
            interface("users", vec![field("id", "string", false)]),
            interface("Widget", vec![]),
        ];

        let first = map_interfaces(&tables, &interfaces);
        let second = map_interfaces(&tables, &first.interfaces);
        assert_eq!(first, second);
    }
}
