use crate::error::{CacheError, Result};
use crate::types::DataType;
use arrow::datatypes::{Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn to_arrow(&self) -> ArrowField {
        ArrowField::new(self.name.clone(), self.data_type.to_arrow(), self.nullable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: vec![] }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn field_with_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// First column name that appears more than once, if any
    pub fn duplicate_name(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .map(|f| f.name())
            .find(|name| !seen.insert(*name))
    }

    pub fn to_arrow(&self) -> ArrowSchema {
        let fields: Vec<ArrowField> = self.fields.iter().map(|f| f.to_arrow()).collect();
        ArrowSchema::new(fields)
    }

    pub fn to_arrow_ref(&self) -> SchemaRef {
        Arc::new(self.to_arrow())
    }

    pub fn from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                let data_type = DataType::from_arrow(f.data_type()).ok_or_else(|| {
                    CacheError::type_mismatch(
                        f.name().as_str(),
                        "a cacheable type",
                        f.data_type().to_string(),
                    )
                })?;
                Ok(Field::new(f.name(), data_type, f.is_nullable()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_schema_roundtrip() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("created_at", DataType::Timestamp, true),
        ]);
        let back = Schema::from_arrow(&schema.to_arrow()).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_duplicate_name() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("id", DataType::Int64, false),
        ]);
        assert_eq!(schema.duplicate_name(), Some("id"));
        assert_eq!(schema.index_of("name"), Some(1));
    }
}
