use crate::error::{PipelineError, Result};
use crate::pipeline::relational::RelationalRow;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

/// Opaque relational store receiving [`RelationalRow`]s. One writer at a
/// time; concurrent runs against the same sink must be serialized
/// externally.
pub trait RelationalSink {
    /// Creates the `sales_transactions` schema. Safe to call when the
    /// schema already exists.
    fn create_schema(&mut self) -> Result<()>;

    /// Replaces the entire table contents with `rows` and returns the
    /// inserted count. Not transactionally atomic.
    fn bulk_insert(&mut self, rows: &[RelationalRow]) -> Result<usize>;

    fn row_count(&self) -> Result<i64>;
}

/// Post-load verification aggregates queried back from the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSummary {
    pub row_count: i64,
    pub distinct_countries: i64,
    pub distinct_products: i64,
    pub distinct_segments: i64,
    pub total_net_sales: f64,
    pub total_profit: f64,
}

/// SQLite-backed relational sink.
pub struct SqliteSink {
    conn: Connection,
}

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS sales_transactions (
        transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
        segment TEXT NOT NULL,
        country TEXT NOT NULL,
        product TEXT NOT NULL,
        discount_band TEXT,
        units_sold REAL NOT NULL,
        manufacturing_price REAL NOT NULL,
        sale_price REAL NOT NULL,
        gross_sales REAL NOT NULL,
        discounts REAL DEFAULT 0,
        net_sales REAL NOT NULL,
        cogs REAL NOT NULL,
        profit REAL NOT NULL,
        transaction_date DATE NOT NULL,
        month_number INTEGER,
        month_name TEXT,
        year INTEGER,
        quarter INTEGER,
        day_of_week INTEGER,
        profit_margin REAL,
        discount_rate REAL,
        revenue_per_unit REAL,
        sales_category TEXT,
        units_category TEXT,
        high_performer INTEGER DEFAULT 0,
        premium_product INTEGER DEFAULT 0,
        created_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO sales_transactions (
        segment, country, product, discount_band, units_sold,
        manufacturing_price, sale_price, gross_sales, discounts, net_sales,
        cogs, profit, transaction_date, month_number, month_name, year,
        quarter, day_of_week, profit_margin, discount_rate, revenue_per_unit,
        sales_category, units_category, high_performer, premium_product
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
    )
"#;

impl SqliteSink {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|e| PipelineError::Persistence {
            message: format!("failed to open database {}: {e}", db_path.display()),
        })?;

        info!("Opened SQLite sink at {}", db_path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PipelineError::Persistence {
            message: format!("failed to open in-memory database: {e}"),
        })?;
        Ok(Self { conn })
    }

    /// Verification summary mirroring what downstream reporting reads.
    pub fn summary(&self) -> Result<SinkSummary> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COUNT(DISTINCT country),
                        COUNT(DISTINCT product),
                        COUNT(DISTINCT segment),
                        COALESCE(SUM(net_sales), 0),
                        COALESCE(SUM(profit), 0)
                 FROM sales_transactions",
                [],
                |row| {
                    Ok(SinkSummary {
                        row_count: row.get(0)?,
                        distinct_countries: row.get(1)?,
                        distinct_products: row.get(2)?,
                        distinct_segments: row.get(3)?,
                        total_net_sales: row.get(4)?,
                        total_profit: row.get(5)?,
                    })
                },
            )
            .map_err(|e| PipelineError::Persistence {
                message: format!("failed to query sink summary: {e}"),
            })
    }
}

impl RelationalSink for SqliteSink {
    fn create_schema(&mut self) -> Result<()> {
        self.conn
            .execute(CREATE_TABLE_SQL, [])
            .map_err(|e| PipelineError::Persistence {
                message: format!("failed to create schema: {e}"),
            })?;
        Ok(())
    }

    fn bulk_insert(&mut self, rows: &[RelationalRow]) -> Result<usize> {
        // Full replace: discard prior contents first. The delete and the
        // batch insert are separate statements, so a mid-batch failure can
        // leave the table empty or partially populated.
        self.conn
            .execute("DELETE FROM sales_transactions", [])
            .map_err(|e| PipelineError::Persistence {
                message: format!("failed to clear prior rows: {e}"),
            })?;

        let mut statement =
            self.conn
                .prepare(INSERT_SQL)
                .map_err(|e| PipelineError::Persistence {
                    message: format!("failed to prepare insert: {e}"),
                })?;

        for (row_index, row) in rows.iter().enumerate() {
            statement
                .execute(params![
                    row.segment,
                    row.country,
                    row.product,
                    row.discount_band,
                    row.units_sold,
                    row.manufacturing_price,
                    row.sale_price,
                    row.gross_sales,
                    row.discounts,
                    row.net_sales,
                    row.cogs,
                    row.profit,
                    row.transaction_date.to_string(),
                    row.month_number,
                    row.month_name,
                    row.year,
                    row.quarter,
                    row.day_of_week,
                    row.profit_margin,
                    row.discount_rate,
                    row.revenue_per_unit,
                    row.sales_category,
                    row.units_category,
                    row.high_performer,
                    row.premium_product,
                ])
                .map_err(|e| PipelineError::Persistence {
                    message: format!("failed to insert row {row_index}: {e}"),
                })?;
        }

        Ok(rows.len())
    }

    fn row_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sales_transactions", [], |row| {
                row.get(0)
            })
            .map_err(|e| PipelineError::Persistence {
                message: format!("failed to count rows: {e}"),
            })
    }
}
