//! Relationship Inference
//!
//! Derives one logical relationship per foreign key. Cardinality is judged
//! from the referencing side only: a foreign key whose column list is also
//! the table's primary key or one of its unique constraints is one-to-one,
//! anything else is many-to-one.

use crate::model::{join_columns, Cardinality, Endpoint, ForeignKey, Relationship, Table};

/// Classify a foreign key declared on `table`
pub fn classify(table: &Table, fk: &ForeignKey) -> Cardinality {
    let key = join_columns(&fk.columns);

    let matches_pk = table
        .primary_key
        .as_ref()
        .is_some_and(|pk| pk.joined() == key);
    let matches_unique = table.unique_constraints.iter().any(|uq| uq.joined() == key);

    if matches_pk || matches_unique {
        Cardinality::OneToOne
    } else {
        Cardinality::ManyToOne
    }
}

/// Derive relationships for every foreign key, in table then key order
pub fn derive(tables: &[Table]) -> Vec<Relationship> {
    tables
        .iter()
        .flat_map(|table| {
            table.foreign_keys.iter().map(move |fk| {
                let from = Endpoint {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    columns: fk.columns.clone(),
                };
                let to = Endpoint {
                    schema: fk.referenced_schema.clone(),
                    table: fk.referenced_table.clone(),
                    columns: fk.referenced_columns.clone(),
                };

                Relationship {
                    name: relationship_name(&from, &to),
                    cardinality: classify(table, fk),
                    from,
                    to,
                    foreign_key: fk.name.clone(),
                }
            })
        })
        .collect()
}

fn relationship_name(from: &Endpoint, to: &Endpoint) -> String {
    format!(
        "{}.{}({}) -> {}.{}({})",
        from.schema,
        from.table,
        from.columns.join(", "),
        to.schema,
        to.table,
        to.columns.join(", ")
    )
}
