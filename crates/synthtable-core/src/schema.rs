//! Schema descriptors attached to persisted tables.
//!
//! A [`TableSchema`] records the ordered column names together with their
//! [`ColumnKind`] and nullability. It is serialized as JSON next to every
//! table written by this crate, so that a later read can rebuild the exact
//! Arrow types instead of guessing them from the SQL representation.
use std::{collections::HashSet, fmt, sync::Arc};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Supported column kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Naive timestamp with second resolution.
    Datetime,
    /// Nullable 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    Str,
}

impl ColumnKind {
    /// Arrow data type used for in-memory columns of this kind.
    pub fn to_arrow_datatype(self) -> DataType {
        match self {
            ColumnKind::Datetime => DataType::Timestamp(TimeUnit::Second, None),
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Str => DataType::Utf8,
        }
    }

    /// Map an Arrow data type back to a column kind, if supported.
    pub fn from_arrow_datatype(dt: &DataType) -> Option<Self> {
        match dt {
            DataType::Timestamp(TimeUnit::Second, None) => Some(ColumnKind::Datetime),
            DataType::Int64 => Some(ColumnKind::Int),
            DataType::Float64 => Some(ColumnKind::Float),
            DataType::Utf8 => Some(ColumnKind::Str),
            _ => None,
        }
    }

    /// Declared SQL type used when creating tables in the relational store.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Datetime => "DATETIME",
            ColumnKind::Int => "BIGINT",
            ColumnKind::Float => "DOUBLE",
            ColumnKind::Str => "TEXT",
        }
    }

    /// Best-effort kind for a declared SQL type, following SQLite's type
    /// affinity rules with an extra case for date/time declarations.
    ///
    /// Returns `None` when the declaration carries no usable hint (for
    /// example an empty declared type), leaving the decision to the values.
    pub fn infer_from_sql_type(declared: &str) -> Option<Self> {
        let upper = declared.to_ascii_uppercase();
        if upper.is_empty() {
            None
        } else if upper.contains("DATE") || upper.contains("TIME") {
            Some(ColumnKind::Datetime)
        } else if upper.contains("INT") {
            Some(ColumnKind::Int)
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Some(ColumnKind::Str)
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUMERIC")
            || upper.contains("DECIMAL")
        {
            Some(ColumnKind::Float)
        } else {
            None
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Datetime => write!(f, "datetime"),
            ColumnKind::Int => write!(f, "int"),
            ColumnKind::Float => write!(f, "float"),
            ColumnKind::Str => write!(f, "str"),
        }
    }
}

/// Column definition in a table schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column kind.
    pub kind: ColumnKind,
    /// Whether the column allows nulls.
    pub nullable: bool,
}

impl ColumnSpec {
    /// Nullable column with the given name and kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    fn to_arrow_field(&self) -> Field {
        Field::new(self.name.clone(), self.kind.to_arrow_datatype(), self.nullable)
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?: {}", self.name, self.kind)
        } else {
            write!(f, "{}: {}", self.name, self.kind)
        }
    }
}

/// Errors raised while building or decoding a [`TableSchema`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// Two columns share the same name.
    #[snafu(display("Duplicate column name: {column}"))]
    DuplicateColumn {
        /// Offending column name.
        column: String,
    },

    /// The column name is reserved for the persisted row index.
    #[snafu(display("Column name {column} is reserved for the row index"))]
    ReservedColumn {
        /// Offending column name.
        column: String,
    },

    /// An Arrow field has a type with no [`ColumnKind`] counterpart.
    #[snafu(display("Unsupported data type for column {column}: {datatype:?}"))]
    UnsupportedType {
        /// Column with the unsupported type.
        column: String,
        /// The Arrow type encountered.
        datatype: DataType,
    },

    /// The stored JSON descriptor could not be parsed or produced.
    #[snafu(display("Invalid schema descriptor JSON: {source}"))]
    Json {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },
}

/// Name of the persisted row-index column.
pub const INDEX_COLUMN: &str = "index";

/// Ordered, validated list of column specs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<ColumnSpec>", into = "Vec<ColumnSpec>")]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Build a schema, rejecting duplicate names and the reserved index name.
    ///
    /// Names are compared ignoring ASCII case, as SQL stores resolve them.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            ensure!(
                !col.name.eq_ignore_ascii_case(INDEX_COLUMN),
                ReservedColumnSnafu {
                    column: col.name.clone()
                }
            );
            ensure!(
                seen.insert(col.name.to_ascii_lowercase()),
                DuplicateColumnSnafu {
                    column: col.name.clone()
                }
            );
        }
        Ok(Self { columns })
    }

    /// Derive a schema descriptor from an Arrow schema.
    pub fn from_arrow(schema: &Schema) -> Result<Self, SchemaError> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                let kind = ColumnKind::from_arrow_datatype(f.data_type()).context(
                    UnsupportedTypeSnafu {
                        column: f.name().clone(),
                        datatype: f.data_type().clone(),
                    },
                )?;
                Ok(ColumnSpec {
                    name: f.name().clone(),
                    kind,
                    nullable: f.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Self::new(columns)
    }

    /// Convert this descriptor to a shared Arrow [`SchemaRef`].
    pub fn to_arrow_schema_ref(&self) -> SchemaRef {
        let fields: Vec<Field> = self.columns.iter().map(ColumnSpec::to_arrow_field).collect();
        Arc::new(Schema::new(fields))
    }

    /// Columns in order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Serialize to the JSON form stored alongside persisted tables.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string(self).context(JsonSnafu)
    }

    /// Parse the stored JSON form.
    pub fn from_json(s: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(s).context(JsonSnafu)
    }
}

impl TryFrom<Vec<ColumnSpec>> for TableSchema {
    type Error = SchemaError;

    fn try_from(columns: Vec<ColumnSpec>) -> Result<Self, Self::Error> {
        TableSchema::new(columns)
    }
}

impl From<TableSchema> for Vec<ColumnSpec> {
    fn from(schema: TableSchema) -> Self {
        schema.columns
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("datetime", ColumnKind::Datetime),
            ColumnSpec::new("int", ColumnKind::Int),
            ColumnSpec::new("float", ColumnKind::Float),
            ColumnSpec::new("str", ColumnKind::Str),
        ])
        .expect("valid schema")
    }

    #[test]
    fn rejects_duplicate_and_reserved_names() {
        let dup = TableSchema::new(vec![
            ColumnSpec::new("a", ColumnKind::Int),
            ColumnSpec::new("a", ColumnKind::Str),
        ]);
        assert!(matches!(dup, Err(SchemaError::DuplicateColumn { column }) if column == "a"));

        let reserved = TableSchema::new(vec![ColumnSpec::new("index", ColumnKind::Int)]);
        assert!(matches!(reserved, Err(SchemaError::ReservedColumn { .. })));
    }

    #[test]
    fn name_checks_ignore_ascii_case() {
        let reserved = TableSchema::new(vec![ColumnSpec::new("Index", ColumnKind::Int)]);
        assert!(matches!(reserved, Err(SchemaError::ReservedColumn { column }) if column == "Index"));

        let dup = TableSchema::new(vec![
            ColumnSpec::new("Value", ColumnKind::Int),
            ColumnSpec::new("VALUE", ColumnKind::Float),
        ]);
        assert!(matches!(dup, Err(SchemaError::DuplicateColumn { column }) if column == "VALUE"));
    }

    #[test]
    fn json_descriptor_uses_snake_case_kinds() -> Result<(), Box<dyn std::error::Error>> {
        let schema = block_schema();
        let json = schema.to_json()?;
        assert!(json.contains(r#""kind":"datetime""#));
        assert!(json.contains(r#""kind":"str""#));
        assert_eq!(TableSchema::from_json(&json)?, schema);
        Ok(())
    }

    #[test]
    fn json_descriptor_is_validated_on_parse() {
        let json = r#"[{"name":"x","kind":"int","nullable":true},{"name":"x","kind":"int","nullable":true}]"#;
        assert!(TableSchema::from_json(json).is_err());
    }

    #[test]
    fn arrow_conversion_is_lossless_for_supported_kinds() -> Result<(), Box<dyn std::error::Error>> {
        let schema = block_schema();
        let arrow = schema.to_arrow_schema_ref();
        assert_eq!(
            arrow.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Second, None)
        );
        assert_eq!(TableSchema::from_arrow(&arrow)?, schema);
        Ok(())
    }

    #[test]
    fn unsupported_arrow_type_is_reported() {
        let arrow = Schema::new(vec![Field::new("flag", DataType::Boolean, false)]);
        let err = TableSchema::from_arrow(&arrow).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { column, .. } if column == "flag"));
    }

    #[test]
    fn infers_kind_from_declared_sql_type() {
        assert_eq!(ColumnKind::infer_from_sql_type("BIGINT"), Some(ColumnKind::Int));
        assert_eq!(ColumnKind::infer_from_sql_type("double"), Some(ColumnKind::Float));
        assert_eq!(ColumnKind::infer_from_sql_type("DATETIME"), Some(ColumnKind::Datetime));
        assert_eq!(ColumnKind::infer_from_sql_type("VARCHAR(10)"), Some(ColumnKind::Str));
        assert_eq!(ColumnKind::infer_from_sql_type(""), None);
    }

    #[test]
    fn display_marks_nullable_columns() {
        let mut col = ColumnSpec::new("int", ColumnKind::Int);
        assert_eq!(col.to_string(), "int?: int");
        col.nullable = false;
        assert_eq!(col.to_string(), "int: int");
    }
}
