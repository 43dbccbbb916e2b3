// src/duck/mod.rs

//! DuckDB-backed table store.

pub mod query;

use crate::config::WriteMode;
use crate::error::Result;
use crate::names::quote_ident;
use crate::process::PARTITION_COLUMN;
use crate::Frame;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, LargeStringArray, StringArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::util::display::array_value_to_string;
use duckdb::types::Value;
use duckdb::{AccessMode, Config, Connection, ToSql};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument};

/// What a [`TableStore::write`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created { rows: usize },
    Appended { rows: usize },
    /// Rows of the frame's months were deleted first.
    Replaced { deleted: usize, rows: usize },
}

impl WriteOutcome {
    pub fn rows(&self) -> usize {
        match *self {
            WriteOutcome::Created { rows }
            | WriteOutcome::Appended { rows }
            | WriteOutcome::Replaced { rows, .. } => rows,
        }
    }
}

/// A DuckDB database holding one table per logical table name.
pub struct TableStore {
    conn: Connection,
}

impl TableStore {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an existing database without write access.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        Ok(Self { conn })
    }

    /// Open a DuckDB in‐memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main' AND table_name = ?",
            [table],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Table names, sorted.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /// Column names in table order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([table], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Persist `frame` into `table`.
    ///
    /// A missing table is created from the frame's schema. An existing one
    /// gets the rows appended without checking its schema against the frame;
    /// under [`WriteMode::ReplacePartition`] rows of the frame's months are
    /// deleted first. Each call is one transaction; separate calls are not.
    #[instrument(level = "info", skip(self, frame), fields(rows = frame.num_rows()))]
    pub fn write(&mut self, table: &str, frame: &Frame, mode: WriteMode) -> Result<WriteOutcome> {
        let exists = self.table_exists(table)?;
        let tx = self.conn.transaction()?;

        let outcome = if !exists {
            tx.execute_batch(&create_table_sql(table, frame))?;
            debug!(table = %table, "created table");
            WriteOutcome::Created { rows: frame.num_rows() }
        } else if mode == WriteMode::ReplacePartition {
            let mut deleted = 0;
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_ident(table),
                quote_ident(PARTITION_COLUMN)
            );
            for month in partition_values(frame) {
                deleted += tx.execute(&sql, [month.as_str()])?;
            }
            WriteOutcome::Replaced { deleted, rows: frame.num_rows() }
        } else {
            WriteOutcome::Appended { rows: frame.num_rows() }
        };

        {
            let mut appender = tx.appender(table)?;
            let columns = frame.columns();
            for row in 0..frame.num_rows() {
                let values = columns
                    .iter()
                    .map(|c| cell_value(c, row))
                    .collect::<Result<Vec<Value>>>()?;
                let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
                appender.append_row(params.as_slice())?;
            }
            appender.flush()?;
        }
        tx.commit()?;

        match outcome {
            WriteOutcome::Created { rows } => info!(table = %table, rows, "Created table"),
            WriteOutcome::Appended { rows } => info!(table = %table, rows, "Inserted into existing table"),
            WriteOutcome::Replaced { deleted, rows } => {
                info!(table = %table, deleted, rows, "Replaced partitions in existing table")
            }
        }
        Ok(outcome)
    }
}

/// `CREATE TABLE` statement matching the frame's columns.
pub fn create_table_sql(table: &str, frame: &Frame) -> String {
    let cols: Vec<String> = frame
        .schema()
        .fields()
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name()), duck_type(f.data_type())))
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(table), cols.join(", "))
}

/// Map an Arrow column type to the DuckDB column type it is stored as.
pub fn duck_type(dt: &DataType) -> &'static str {
    match dt {
        DataType::Boolean => "BOOLEAN",
        DataType::Int8 => "TINYINT",
        DataType::Int16 => "SMALLINT",
        DataType::Int32 => "INTEGER",
        DataType::Int64 => "BIGINT",
        DataType::UInt8 => "UTINYINT",
        DataType::UInt16 => "USMALLINT",
        DataType::UInt32 => "UINTEGER",
        DataType::UInt64 => "UBIGINT",
        DataType::Float32 => "FLOAT",
        DataType::Float64 => "DOUBLE",
        DataType::Date32 | DataType::Date64 => "DATE",
        DataType::Timestamp(_, _) => "TIMESTAMP",
        // text, and all-null columns with no inferred type
        _ => "VARCHAR",
    }
}

fn partition_values(frame: &Frame) -> BTreeSet<String> {
    let Ok(idx) = frame.schema().index_of(PARTITION_COLUMN) else {
        return BTreeSet::new();
    };
    let column = frame.column(idx);
    (0..column.len())
        .filter(|&i| column.is_valid(i))
        .filter_map(|i| array_value_to_string(column, i).ok())
        .collect()
}

macro_rules! downcast_value {
    ($column:expr, $row:expr, $array:ty, $variant:ident) => {
        $column
            .as_any()
            .downcast_ref::<$array>()
            .map(|a| Value::$variant(a.value($row).into()))
    };
}

/// One cell as a DuckDB value. Types without a direct mapping go in as
/// their Arrow text rendering and DuckDB casts them to the column type.
fn cell_value(column: &ArrayRef, row: usize) -> Result<Value> {
    // NullArray reports no physical nulls
    if column.data_type() == &DataType::Null || column.is_null(row) {
        return Ok(Value::Null);
    }
    let direct = match column.data_type() {
        DataType::Boolean => downcast_value!(column, row, BooleanArray, Boolean),
        DataType::Int8 => downcast_value!(column, row, Int8Array, TinyInt),
        DataType::Int16 => downcast_value!(column, row, Int16Array, SmallInt),
        DataType::Int32 => downcast_value!(column, row, Int32Array, Int),
        DataType::Int64 => downcast_value!(column, row, Int64Array, BigInt),
        DataType::UInt8 => downcast_value!(column, row, UInt8Array, UTinyInt),
        DataType::UInt16 => downcast_value!(column, row, UInt16Array, USmallInt),
        DataType::UInt32 => downcast_value!(column, row, UInt32Array, UInt),
        DataType::UInt64 => downcast_value!(column, row, UInt64Array, UBigInt),
        DataType::Float32 => downcast_value!(column, row, Float32Array, Float),
        DataType::Float64 => downcast_value!(column, row, Float64Array, Double),
        DataType::Utf8 => downcast_value!(column, row, StringArray, Text),
        DataType::LargeUtf8 => downcast_value!(column, row, LargeStringArray, Text),
        _ => None,
    };
    match direct {
        Some(v) => Ok(v),
        None => Ok(Value::Text(array_value_to_string(column, row)?)),
    }
}
