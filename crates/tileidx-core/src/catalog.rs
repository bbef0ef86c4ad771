//! Schema catalog (spec §4.8 / C8): the single source of truth for tile and
//! vector-row columns. C1 builds storage DDL from this list; C3 builds the
//! Arrow schema from it. Add a field here, nowhere else.

/// Scalar type tag for a catalog column, engine-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int32,
    Int64,
    Float64,
}

/// One entry in the catalog: name, type, nullability.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, ty: ColumnType, nullable: bool) -> ColumnSpec {
    ColumnSpec { name, ty, nullable }
}

/// Tile registry columns (C1), in declared order. `tile_id` is the primary key.
pub const TILE_DB_COLUMNS: &[ColumnSpec] = &[
    col("tile_id", ColumnType::Text, false),
    col("image_id", ColumnType::Int64, false),
    col("source", ColumnType::Text, true),
    col("tile_store", ColumnType::Text, true),
    col("image_path", ColumnType::Text, true),
    col("raster_path", ColumnType::Text, true),
    col("pixel_polygon", ColumnType::Text, true),
    col("geo_polygon", ColumnType::Text, true),
    col("lat", ColumnType::Float64, true),
    col("lon", ColumnType::Float64, true),
    col("utm_zone", ColumnType::Text, true),
    col("width", ColumnType::Int32, true),
    col("height", ColumnType::Int32, true),
    col("status", ColumnType::Text, false),
    col("indexed_at", ColumnType::Int64, true),
    col("embedder_backend", ColumnType::Text, true),
    col("embedder_model", ColumnType::Text, true),
];

/// Metadata columns projected onto every vector row (C3), beyond `id` and
/// the embedding column itself.
pub const VECTOR_METADATA_COLUMNS: &[ColumnSpec] = &[
    col("image_path", ColumnType::Text, true),
    col("image_id", ColumnType::Int64, false),
    col("width", ColumnType::Int32, true),
    col("height", ColumnType::Int32, true),
    col("run_id", ColumnType::Text, true),
    col("tile_id", ColumnType::Text, false),
    col("source", ColumnType::Text, true),
    col("raster_path", ColumnType::Text, true),
    col("pixel_polygon", ColumnType::Text, true),
    col("geo_polygon", ColumnType::Text, true),
    col("lat", ColumnType::Float64, true),
    col("lon", ColumnType::Float64, true),
    col("utm_zone", ColumnType::Text, true),
    col("tile_store", ColumnType::Text, true),
    col("embedder_backend", ColumnType::Text, true),
    col("embedder_model", ColumnType::Text, true),
];

/// Default vector-column name.
pub const DEFAULT_VECTOR_COLUMN: &str = "embedding";

/// Full vector-row schema: `id`, then the metadata columns. The embedding
/// column is appended separately by C3 since its width depends on `D`.
pub fn vector_schema_columns() -> Vec<ColumnSpec> {
    let mut out = vec![col("id", ColumnType::Text, false)];
    out.extend_from_slice(VECTOR_METADATA_COLUMNS);
    out
}

/// Names only, in order, for the tile table.
pub fn tile_column_names() -> Vec<&'static str> {
    TILE_DB_COLUMNS.iter().map(|c| c.name).collect()
}

/// Names only, in order, for the vector metadata projection.
pub fn vector_metadata_column_names() -> Vec<&'static str> {
    VECTOR_METADATA_COLUMNS.iter().map(|c| c.name).collect()
}

/// Default projection for `vectorSearch` results: metadata columns filtered
/// down to the ones actually present on a table (spec §4.3).
pub fn default_search_projection(existing_columns: &[String]) -> Vec<String> {
    vector_metadata_column_names()
        .into_iter()
        .filter(|c| existing_columns.iter().any(|e| e == c))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_id_is_first_and_non_nullable() {
        assert_eq!(TILE_DB_COLUMNS[0].name, "tile_id");
        assert!(!TILE_DB_COLUMNS[0].nullable);
    }

    #[test]
    fn vector_schema_starts_with_id() {
        let cols = vector_schema_columns();
        assert_eq!(cols[0].name, "id");
        assert_eq!(cols.len(), VECTOR_METADATA_COLUMNS.len() + 1);
    }

    #[test]
    fn default_projection_filters_to_existing() {
        let existing = vec!["tile_id".to_string(), "lat".to_string(), "bogus".to_string()];
        let projected = default_search_projection(&existing);
        assert!(projected.contains(&"tile_id".to_string()));
        assert!(projected.contains(&"lat".to_string()));
        assert!(!projected.iter().any(|c| c == "bogus"));
    }
}
