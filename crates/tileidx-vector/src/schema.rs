//! Arrow schema construction (spec §4.3): vector column is a fixed-size
//! list of float32 or float16 at a table-immutable dimension `D`; every
//! other column is built from the catalog (C8), nullable and typed.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use tileidx_core::catalog::{self, ColumnType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDType {
    Float32,
    Float16,
}

impl VectorDType {
    pub fn arrow_item_type(self) -> DataType {
        match self {
            Self::Float32 => DataType::Float32,
            Self::Float16 => DataType::Float16,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float32" => Some(Self::Float32),
            "float16" => Some(Self::Float16),
            _ => None,
        }
    }
}

pub const DEFAULT_ID_COLUMN: &str = "id";

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::Float64 => DataType::Float64,
    }
}

/// Build the full vector-row Arrow schema for dimension `D` and dtype.
/// `id` is always non-nullable; metadata columns come from the catalog.
pub fn build_schema(vector_col: &str, dim: i32, dtype: VectorDType) -> Arc<Schema> {
    let mut fields = vec![Field::new(DEFAULT_ID_COLUMN, DataType::Utf8, false)];

    for col in catalog::VECTOR_METADATA_COLUMNS {
        fields.push(Field::new(col.name, arrow_type(col.ty), col.nullable));
    }

    fields.push(Field::new(
        vector_col,
        DataType::FixedSizeList(Arc::new(Field::new("item", dtype.arrow_item_type(), true)), dim),
        false,
    ));

    Arc::new(Schema::new(fields))
}

/// Extract the configured dimension from an existing table schema, used to
/// detect a `SchemaConflict` against a caller's requested `D`.
pub fn vector_dim_from_schema(schema: &Schema, vector_col: &str) -> Option<i32> {
    schema.field_with_name(vector_col).ok().and_then(|f| match f.data_type() {
        DataType::FixedSizeList(_, dim) => Some(*dim),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_carries_requested_dimension() {
        let schema = build_schema("embedding", 768, VectorDType::Float32);
        assert_eq!(vector_dim_from_schema(&schema, "embedding"), Some(768));
    }

    #[test]
    fn id_column_is_non_nullable() {
        let schema = build_schema("embedding", 128, VectorDType::Float32);
        let id_field = schema.field_with_name("id").unwrap();
        assert!(!id_field.is_nullable());
    }
}
