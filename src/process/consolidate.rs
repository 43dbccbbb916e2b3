// src/process/consolidate.rs

use crate::config::TypeWidening;
use crate::error::{IngestError, Result};
use crate::Frame;
use arrow::array::ArrayRef;
use arrow::compute::{can_cast_types, cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{info, warn};

/// Stack all part frames of one logical table into a single frame.
///
/// Columns are matched by name and laid out in the first frame's order.
/// Differing types are reconciled per `widening`; anything it cannot
/// reconcile fails the whole table. `Ok(None)` means there was nothing to
/// stack.
pub fn consolidate(table: &str, frames: Vec<Frame>, widening: TypeWidening) -> Result<Option<Frame>> {
    let Some(first) = frames.first() else {
        warn!(table = %table, "No valid data for table");
        return Ok(None);
    };

    let target = unified_schema(table, &frames, widening)?;
    let order: Vec<String> = first
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    let aligned = frames
        .iter()
        .map(|frame| align(table, frame, &order, &target))
        .collect::<Result<Vec<_>>>()?;
    let combined = concat_batches(&target, &aligned)?;

    info!(table = %table, rows = combined.num_rows(), parts = frames.len(), "Loaded rows for table");
    Ok(Some(combined))
}

fn mismatch(table: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Consolidation {
        table: table.to_string(),
        reason: reason.into(),
    }
}

/// Column set of the first frame with every type widened across all frames.
fn unified_schema(table: &str, frames: &[Frame], widening: TypeWidening) -> Result<SchemaRef> {
    let first = frames[0].schema();
    let mut types: Vec<DataType> = first.fields().iter().map(|f| f.data_type().clone()).collect();

    for (i, frame) in frames.iter().enumerate().skip(1) {
        let schema = frame.schema();
        if schema.fields().len() != first.fields().len() {
            return Err(mismatch(
                table,
                format!(
                    "frame {i} has {} columns, expected {}",
                    schema.fields().len(),
                    first.fields().len()
                ),
            ));
        }
        for (slot, field) in types.iter_mut().zip(first.fields()) {
            let idx = schema
                .index_of(field.name())
                .map_err(|_| mismatch(table, format!("frame {i} lacks column {:?}", field.name())))?;
            let other = schema.field(idx).data_type();
            let widened = widen(slot, other, widening).ok_or_else(|| {
                mismatch(
                    table,
                    format!("column {:?} is {slot} in one part and {other} in another", field.name()),
                )
            })?;
            *slot = widened;
        }
    }

    let fields: Vec<Field> = first
        .fields()
        .iter()
        .zip(types)
        .map(|(f, ty)| Field::new(f.name(), ty, true))
        .collect();
    Ok(Arc::new(Schema::new(fields)))
}

/// Common type for one column seen as `a` and `b`, if `widening` allows it.
pub fn widen(a: &DataType, b: &DataType, widening: TypeWidening) -> Option<DataType> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (DataType::Null, t) | (t, DataType::Null) => Some(t.clone()),
        _ if widening != TypeWidening::Strict && a.is_numeric() && b.is_numeric() => {
            Some(DataType::Float64)
        }
        _ if widening == TypeWidening::Text => Some(DataType::Utf8),
        _ => None,
    }
}

/// Reorder `frame`'s columns to `order` and cast them to `target`.
fn align(table: &str, frame: &Frame, order: &[String], target: &SchemaRef) -> Result<RecordBatch> {
    let schema = frame.schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(order.len());
    for (name, field) in order.iter().zip(target.fields()) {
        let idx = schema
            .index_of(name)
            .map_err(|_| mismatch(table, format!("column {name:?} missing")))?;
        let column = frame.column(idx);
        if column.data_type() == field.data_type() {
            columns.push(column.clone());
        } else if can_cast_types(column.data_type(), field.data_type()) {
            columns.push(cast(column, field.data_type())?);
        } else {
            return Err(mismatch(
                table,
                format!("cannot cast {name:?} from {} to {}", column.data_type(), field.data_type()),
            ));
        }
    }
    Ok(RecordBatch::try_new(target.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::frame::FrameBuilder;
    use crate::walk::MonthPartition;
    use crate::InferencePolicy;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};

    fn parse(text: &str) -> Frame {
        FrameBuilder::new(InferencePolicy::default(), ".txt")
            .unwrap()
            .parse_text(text, &MonthPartition::parse("2024-03").unwrap())
            .unwrap()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(consolidate("t", Vec::new(), TypeWidening::Strict).unwrap().is_none());
    }

    #[test]
    fn stacks_rows_in_part_order() {
        let a = parse("id|name\n1|a\n2|b\n");
        let b = parse("id|name\n3|c\n");
        let out = consolidate("t", vec![a, b], TypeWidening::Strict).unwrap().unwrap();

        assert_eq!(out.num_rows(), 3);
        let ids = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn columns_are_matched_by_name_not_position() {
        let a = parse("id|name\n1|a\n");
        let b = parse("name|id\nb|2\n");
        let out = consolidate("t", vec![a, b], TypeWidening::Strict).unwrap().unwrap();

        let names = out.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(1), "b");
        let ids = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.value(1), 2);
    }

    #[test]
    fn all_null_column_adopts_the_other_type() {
        let a = parse("id|note\n1|\n");
        let b = parse("id|note\n2|hello\n");
        let out = consolidate("t", vec![a, b], TypeWidening::Strict).unwrap().unwrap();
        assert_eq!(out.schema().field(1).data_type(), &DataType::Utf8);
        assert!(out.column(1).is_null(0));
    }

    #[test]
    fn type_conflicts_follow_the_widening_policy() {
        let ints = || parse("v\n1\n");
        let floats = || parse("v\n1.5\n");
        let text = || parse("v\nabc\n");

        assert!(matches!(
            consolidate("t", vec![ints(), floats()], TypeWidening::Strict),
            Err(IngestError::Consolidation { .. })
        ));

        let out = consolidate("t", vec![ints(), floats()], TypeWidening::Numeric)
            .unwrap()
            .unwrap();
        let v = out.column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(v.values().to_vec(), vec![1.0, 1.5]);

        assert!(consolidate("t", vec![ints(), text()], TypeWidening::Numeric).is_err());
        let out = consolidate("t", vec![ints(), text()], TypeWidening::Text)
            .unwrap()
            .unwrap();
        assert_eq!(out.schema().field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn different_column_sets_fail_the_table() {
        let a = parse("id|name\n1|a\n");
        let b = parse("id|other\n2|b\n");
        let c = parse("id\n3\n");
        assert!(consolidate("t", vec![a.clone(), b], TypeWidening::Text).is_err());
        assert!(consolidate("t", vec![a, c], TypeWidening::Text).is_err());
    }
}
