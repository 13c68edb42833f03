//! DDL generation from registered metadata.
//!
//! Generates `CREATE TABLE`, `CREATE INDEX`, junction-table and `DROP TABLE`
//! statements for the entities in a [`Registry`]. Every table, column and
//! index name is checked with [`validate_identifier`] before it is spliced
//! into SQL.
//!
//! # Statement order
//!
//! [`schema_statements`] walks the registered tables in registration order
//! and emits, per table: `CREATE TABLE IF NOT EXISTS`, then each index, then
//! each owned many-to-many junction table. [`drop_statements`] reverses that
//! order so junctions go before the tables they reference.

use std::collections::HashSet;

use relata_core::{
    EntityKey, IndexDescriptor, JoinStrategy, MappingError, RelationDescriptor, RelationResolver,
    Registry, ResolvedRelation, TableDescriptor, validate_identifier,
};
use tracing::debug;

use crate::error::Result;

/// Resolves a relation for DDL purposes.
///
/// An unresolved related type yields `None`: the relation contributes no
/// column, foreign key or junction, and the rest of the schema is still
/// generated. Operations that use the relation report the failure.
fn resolve_for_schema<'r>(
    resolver: &RelationResolver<'r>,
    relation: &'r RelationDescriptor,
) -> Result<Option<ResolvedRelation<'r>>> {
    match resolver.resolve(relation) {
        Ok(resolved) => Ok(Some(resolved)),
        Err(MappingError::UnresolvedRelation { entity, property }) => {
            debug!(entity = %entity, property = %property, "Skipping unresolved relation in schema");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Generates `CREATE TABLE IF NOT EXISTS` for one entity.
///
/// Emits one definition per column (primary → `PRIMARY KEY`, generated
/// primary → `AUTOINCREMENT`, non-nullable → `NOT NULL`), then one foreign
/// key column and `FOREIGN KEY` clause per owning to-one relation.
///
/// # Errors
///
/// Returns [`MappingError::EntityNotRegistered`](relata_core::MappingError)
/// for unknown entities and `InvalidIdentifier` for names that are not plain
/// identifiers. A relation whose related type does not resolve is left out.
pub fn create_table_sql(registry: &Registry, entity: &EntityKey) -> Result<String> {
    let table = registry.table(entity)?;
    validate_identifier(&table.name)?;

    let columns = registry.find_columns(entity);
    let mut definitions = Vec::with_capacity(columns.len());
    for column in &columns {
        validate_identifier(&column.property)?;
        let mut def = format!("{} {}", column.property, column.column_type.sql_type());
        if column.primary {
            def.push_str(" PRIMARY KEY");
            if column.generated {
                def.push_str(" AUTOINCREMENT");
            }
        } else if !column.nullable {
            def.push_str(" NOT NULL");
        }
        definitions.push(def);
    }

    let resolver = RelationResolver::new(registry);
    let mut foreign_keys = Vec::new();
    for relation in registry.find_relations(entity) {
        if !RelationResolver::owns_foreign_key(relation) {
            continue;
        }
        let Some(resolved) = resolve_for_schema(&resolver, relation)? else {
            continue;
        };
        let JoinStrategy::Owner { column } = &resolved.join else {
            continue;
        };
        validate_identifier(column)?;
        let (related_pk, related_type) = primary_of(registry, resolved.related);

        if !columns.iter().any(|c| &c.property == column) {
            definitions.push(format!("{column} {related_type}"));
        }
        let mut clause = format!(
            "FOREIGN KEY ({column}) REFERENCES {}({related_pk})",
            resolved.related.name
        );
        if let Some(action) = relation.on_delete {
            clause.push_str(" ON DELETE ");
            clause.push_str(action.as_sql());
        }
        foreign_keys.push(clause);
    }

    definitions.extend(foreign_keys);
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table.name,
        definitions.join(",\n    ")
    ))
}

/// Default index name: `IDX_<table>_<col1>_<col2>…`.
pub fn default_index_name(table: &str, columns: &[String]) -> String {
    format!("IDX_{table}_{}", columns.join("_"))
}

/// Generates `CREATE [UNIQUE] INDEX IF NOT EXISTS` for an index descriptor.
pub fn create_index_sql(table: &TableDescriptor, index: &IndexDescriptor) -> Result<String> {
    validate_identifier(&table.name)?;
    for column in &index.columns {
        validate_identifier(column)?;
    }
    let name = index
        .name
        .clone()
        .unwrap_or_else(|| default_index_name(&table.name, &index.columns));
    validate_identifier(&name)?;

    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {unique}INDEX IF NOT EXISTS {name} ON {}({})",
        table.name,
        index.columns.join(", ")
    ))
}

/// Generates the junction table for a resolved many-to-many relation.
///
/// Returns `None` for any other join strategy. The junction has a composite
/// primary key over both columns, each referencing its table with
/// `ON DELETE CASCADE`.
pub fn create_junction_sql(registry: &Registry, resolved: &ResolvedRelation<'_>) -> Result<Option<String>> {
    let JoinStrategy::Junction(junction) = &resolved.join else {
        return Ok(None);
    };
    validate_identifier(&junction.table)?;
    validate_identifier(&junction.owner_column)?;
    validate_identifier(&junction.related_column)?;

    let (owner_pk, owner_type) = primary_of(registry, resolved.owner);
    let (related_pk, related_type) = primary_of(registry, resolved.related);

    Ok(Some(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
         {owner_col} {owner_type} NOT NULL,\n    \
         {related_col} {related_type} NOT NULL,\n    \
         PRIMARY KEY ({owner_col}, {related_col}),\n    \
         FOREIGN KEY ({owner_col}) REFERENCES {owner_table}({owner_pk}) ON DELETE CASCADE,\n    \
         FOREIGN KEY ({related_col}) REFERENCES {related_table}({related_pk}) ON DELETE CASCADE\n)",
        table = junction.table,
        owner_col = junction.owner_column,
        related_col = junction.related_column,
        owner_table = resolved.owner.name,
        related_table = resolved.related.name,
    )))
}

/// Generates `DROP TABLE IF EXISTS` for a table or junction name.
pub fn drop_table_sql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("DROP TABLE IF EXISTS {name}"))
}

/// All statements needed to create the registered schema, in execution order.
///
/// Junction tables are emitted once per name; the side that owns the join
/// table produces it.
pub fn schema_statements(registry: &Registry) -> Result<Vec<String>> {
    let resolver = RelationResolver::new(registry);
    let mut statements = Vec::new();
    let mut junctions: HashSet<String> = HashSet::new();

    for table in registry.tables() {
        statements.push(create_table_sql(registry, &table.entity)?);
        for index in registry.find_indices(&table.entity) {
            statements.push(create_index_sql(table, index)?);
        }
        for relation in registry.find_relations(&table.entity) {
            let Some(resolved) = resolve_for_schema(&resolver, relation)? else {
                continue;
            };
            let JoinStrategy::Junction(junction) = &resolved.join else {
                continue;
            };
            if !junction.owning || !junctions.insert(junction.table.clone()) {
                continue;
            }
            if let Some(sql) = create_junction_sql(registry, &resolved)? {
                statements.push(sql);
            }
        }
    }

    Ok(statements)
}

/// Names of every junction table owned by registered relations.
pub fn junction_tables(registry: &Registry) -> Result<Vec<String>> {
    let resolver = RelationResolver::new(registry);
    let mut names = Vec::new();
    for table in registry.tables() {
        for relation in registry.find_relations(&table.entity) {
            let Some(resolved) = resolve_for_schema(&resolver, relation)? else {
                continue;
            };
            if let JoinStrategy::Junction(junction) = resolved.join {
                if junction.owning && !names.contains(&junction.table) {
                    names.push(junction.table);
                }
            }
        }
    }
    Ok(names)
}

/// Statements dropping every junction, then every table in reverse
/// registration order.
pub fn drop_statements(registry: &Registry) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for junction in junction_tables(registry)?.iter().rev() {
        statements.push(drop_table_sql(junction)?);
    }
    for table in registry.tables().iter().rev() {
        statements.push(drop_table_sql(&table.name)?);
    }
    Ok(statements)
}

/// Primary key column name and SQL type of a table, defaulting to
/// `id INTEGER` for tables without columns.
fn primary_of(registry: &Registry, table: &TableDescriptor) -> (String, &'static str) {
    registry
        .primary_column(&table.entity)
        .map(|c| (c.property.clone(), c.column_type.sql_type()))
        .unwrap_or_else(|| ("id".to_string(), "INTEGER"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relata_core::{ColumnMode, ColumnType, EntityDefinition, OnDelete, RelationKind};

    fn blog() -> Registry {
        let mut registry = Registry::new();
        EntityDefinition::new("User", "users")
            .generated_primary("id")
            .column("email", ColumnType::String)
            .column_with("bio", ColumnType::Text, |c| c.nullable())
            .relation("posts", RelationKind::OneToMany, "Post")
            .unique_index(["email"])
            .register(&mut registry);
        EntityDefinition::new("Post", "posts")
            .generated_primary("id")
            .column("title", ColumnType::String)
            .special("deletedAt", ColumnType::Datetime, ColumnMode::DeleteDate)
            .relation_with("author", RelationKind::ManyToOne, "User", |r| {
                r.with_on_delete(OnDelete::Cascade)
            })
            .relation("tags", RelationKind::ManyToMany, "Tag")
            .join_table("tags", None)
            .index(["title", "deletedAt"])
            .register(&mut registry);
        EntityDefinition::new("Tag", "tags")
            .generated_primary("id")
            .column("label", ColumnType::String)
            .relation("posts", RelationKind::ManyToMany, "Post")
            .register(&mut registry);
        registry.finalize();
        registry
    }

    #[test]
    fn test_create_table_column_flags() {
        let registry = blog();
        let sql = create_table_sql(&registry, &EntityKey::from("User")).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS users ("));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("email TEXT NOT NULL"));
        assert!(sql.contains("bio TEXT,") || sql.ends_with("bio TEXT\n)"));
        assert!(!sql.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_create_table_foreign_key_with_on_delete() {
        let registry = blog();
        let sql = create_table_sql(&registry, &EntityKey::from("Post")).unwrap();
        assert!(sql.contains("authorId INTEGER"));
        assert!(sql.contains("FOREIGN KEY (authorId) REFERENCES users(id) ON DELETE CASCADE"));
        assert!(sql.contains("deletedAt INTEGER"));
        assert!(!sql.contains("deletedAt INTEGER NOT NULL"));
    }

    #[test]
    fn test_create_table_unregistered_entity() {
        let registry = blog();
        assert!(create_table_sql(&registry, &EntityKey::from("Ghost")).is_err());
    }

    #[test]
    fn test_create_index_default_name() {
        let registry = blog();
        let table = registry.find_table(&EntityKey::from("Post")).unwrap();
        let index = registry.find_indices(&EntityKey::from("Post"))[0];
        assert_eq!(
            create_index_sql(table, index).unwrap(),
            "CREATE INDEX IF NOT EXISTS IDX_posts_title_deletedAt ON posts(title, deletedAt)"
        );
    }

    #[test]
    fn test_create_unique_index_named() {
        let table = TableDescriptor::new("User", "users");
        let index = IndexDescriptor::new("User", ["email"]).unique().named("uq_email");
        assert_eq!(
            create_index_sql(&table, &index).unwrap(),
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_email ON users(email)"
        );
    }

    #[test]
    fn test_junction_table_sql() {
        let registry = blog();
        let resolved = RelationResolver::new(&registry)
            .resolve_property(&EntityKey::from("Post"), "tags")
            .unwrap();
        let sql = create_junction_sql(&registry, &resolved).unwrap().unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS posts_tags"));
        assert!(sql.contains("PRIMARY KEY (postsId, tagsId)"));
        assert!(sql.contains("FOREIGN KEY (postsId) REFERENCES posts(id) ON DELETE CASCADE"));
        assert!(sql.contains("FOREIGN KEY (tagsId) REFERENCES tags(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_schema_statements_order_and_dedup() {
        let registry = blog();
        let statements = schema_statements(&registry).unwrap();
        let kinds: Vec<&str> = statements
            .iter()
            .map(|s| s.split('(').next().unwrap().trim())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "CREATE TABLE IF NOT EXISTS users",
                "CREATE UNIQUE INDEX IF NOT EXISTS IDX_users_email ON users",
                "CREATE TABLE IF NOT EXISTS posts",
                "CREATE INDEX IF NOT EXISTS IDX_posts_title_deletedAt ON posts",
                "CREATE TABLE IF NOT EXISTS posts_tags",
                "CREATE TABLE IF NOT EXISTS tags",
            ]
        );
    }

    #[test]
    fn test_schema_executes_against_sqlite() {
        let registry = blog();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        for sql in schema_statements(&registry).unwrap() {
            conn.execute_batch(&sql).unwrap();
        }
        for sql in drop_statements(&registry).unwrap() {
            conn.execute_batch(&sql).unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_drop_statements_reverse_order() {
        let registry = blog();
        assert_eq!(
            drop_statements(&registry).unwrap(),
            vec![
                "DROP TABLE IF EXISTS posts_tags",
                "DROP TABLE IF EXISTS tags",
                "DROP TABLE IF EXISTS posts",
                "DROP TABLE IF EXISTS users",
            ]
        );
    }

    #[test]
    fn test_unresolved_relation_is_left_out_of_schema() {
        let mut registry = Registry::new();
        EntityDefinition::new("Post", "posts")
            .generated_primary("id")
            .column("title", ColumnType::String)
            .lazy_relation("ghost", RelationKind::ManyToOne, || None, |r| r)
            .lazy_relation("phantoms", RelationKind::ManyToMany, || Some(EntityKey::from("Phantom")), |r| r)
            .join_table("phantoms", None)
            .register(&mut registry);
        registry.finalize();

        let sql = create_table_sql(&registry, &EntityKey::from("Post")).unwrap();
        assert!(!sql.contains("ghostId"));
        assert!(!sql.contains("FOREIGN KEY"));
        assert_eq!(schema_statements(&registry).unwrap().len(), 1);
        assert!(junction_tables(&registry).unwrap().is_empty());
    }

    #[test]
    fn test_drop_table_rejects_bad_identifier() {
        assert!(drop_table_sql("users; --").is_err());
    }
}
