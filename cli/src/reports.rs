//! Reports over the mirrored tables.
//!
//! Each report is a single query rendered either as an aligned plain-text
//! table or as CSV. Totals are truncated to whole kilometers and hours;
//! the cumulative report keeps two decimals.

use crate::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool};

/// Output format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Plain,
    Csv,
}

/// A rendered report cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    fn is_numeric(&self) -> bool {
        matches!(self, Cell::Integer(_) | Cell::Real(_))
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Real(r) => write!(f, "{:.2}", r),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Query result ready for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Report {
    /// Render in the given format. An empty report renders as nothing.
    pub fn render(&self, format: Format) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        match format {
            Format::Plain => self.render_plain(),
            Format::Csv => self.render_csv(),
        }
    }

    fn render_plain(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();

        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                rows.iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let header: Vec<String> = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:<w$}", h, w = *w))
            .collect();
        out.push_str(header.join("  ").trim_end());
        out.push('\n');

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');

        for (cells, texts) in self.rows.iter().zip(&rows) {
            let line: Vec<String> = cells
                .iter()
                .zip(texts)
                .zip(&widths)
                .map(|((cell, text), w)| {
                    if cell.is_numeric() {
                        format!("{:>w$}", text, w = *w)
                    } else {
                        format!("{:<w$}", text, w = *w)
                    }
                })
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }

        out
    }

    fn render_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.headers.iter().map(|h| csv_field(h)).collect();
        out.push_str(&header.join(","));
        out.push('\n');

        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|c| csv_field(&c.to_string())).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }

        out
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> Cell {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Cell::Null, Cell::Integer);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Cell::Null, Cell::Real);
    }
    match row.try_get::<Option<String>, _>(index) {
        Ok(Some(s)) => Cell::Text(s),
        _ => Cell::Null,
    }
}

async fn query_report(pool: &SqlitePool, sql: &str, params: &[String]) -> Result<Report> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = query.bind(param.as_str());
    }
    let rows = query.fetch_all(pool).await?;

    let headers = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => Vec::new(),
    };
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_cell(row, i)).collect())
        .collect();

    Ok(Report { headers, rows })
}

fn year_pattern(year: i32) -> String {
    format!("{:04}-%", year)
}

/// Period a cumulative report groups activities by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Resolution {
    Day,
    #[default]
    Month,
    Year,
}

impl Resolution {
    fn as_str(self) -> &'static str {
        match self {
            Resolution::Day => "day",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }
}

/// Total distance and moving time per bike.
pub async fn bikes(pool: &SqlitePool) -> Result<Report> {
    query_report(
        pool,
        r#"
        SELECT
            b.name AS "Bike",
            CAST(SUM(a.distance) / 1000 AS INT) AS "Distance (km)",
            CAST(SUM(a.moving_time) / 3600 AS INT) AS "Moving time (hour)"
        FROM activity a INNER JOIN bike b ON a.gear_id = b.id
        GROUP BY 1
        ORDER BY 2 DESC
        "#,
        &[],
    )
    .await
}

/// Distance and moving time per activity type for one year.
pub async fn yearly(pool: &SqlitePool, year: i32) -> Result<Report> {
    query_report(
        pool,
        r#"
        SELECT
            a.type AS "Activity type",
            CAST(SUM(a.distance) / 1000 AS INT) AS "Distance (km)",
            CAST(SUM(a.moving_time) / 3600 AS INT) AS "Moving time (hour)"
        FROM activity a
        WHERE start_date LIKE ?
        GROUP BY 1
        ORDER BY 2 DESC
        "#,
        &[year_pattern(year)],
    )
    .await
}

/// Distance and moving time per bike for one year.
pub async fn yearly_bikes(pool: &SqlitePool, year: i32) -> Result<Report> {
    query_report(
        pool,
        r#"
        SELECT
            b.name AS "Bike",
            CAST(SUM(a.distance) / 1000 AS INT) AS "Distance (km)",
            CAST(SUM(a.moving_time) / 3600 AS INT) AS "Moving time (hour)"
        FROM activity a INNER JOIN bike b ON a.gear_id = b.id
        WHERE start_date LIKE ?
        GROUP BY 1
        ORDER BY 2 DESC
        "#,
        &[year_pattern(year)],
    )
    .await
}

/// Per bike distance, elevation and moving time per period, with running
/// totals.
///
/// Running totals start at the first activity of each bike; `start_year` and
/// `end_year` only limit which periods are shown. `bike` filters by bike name
/// prefix.
pub async fn bikes_cumulative(
    pool: &SqlitePool,
    resolution: Resolution,
    bike: Option<&str>,
    start_year: i32,
    end_year: i32,
) -> Result<Report> {
    query_report(
        pool,
        r#"
        WITH
        periods AS (
            SELECT
                b.name AS "Bike",
                CASE ?1
                    WHEN 'day' THEN strftime('%Y-%m-%d', a.start_date)
                    WHEN 'month' THEN strftime('%Y-%m-01', a.start_date)
                    ELSE strftime('%Y-01-01', a.start_date)
                END AS "Date",
                SUM(a.distance) / 1000.0 AS "Distance (km)",
                SUM(a.moving_time) / 3600.0 AS "Moving time (hour)",
                SUM(a.total_elevation_gain) * 1.0 AS "Total elevation (m)"
            FROM activity a INNER JOIN bike b ON a.gear_id = b.id
            GROUP BY 1, 2
        ),
        running AS (
            SELECT
                *,
                SUM("Distance (km)") OVER (PARTITION BY "Bike" ORDER BY "Date") AS "Cumulative (km)",
                SUM("Moving time (hour)") OVER (PARTITION BY "Bike" ORDER BY "Date") AS "Cumulative (hour)",
                SUM("Total elevation (m)") OVER (PARTITION BY "Bike" ORDER BY "Date") AS "Cumulative (elevation)"
            FROM periods
        )
        SELECT
            "Bike",
            "Date",
            ROUND("Distance (km)", 2) AS "Distance (km)",
            ROUND("Cumulative (km)", 2) AS "Cumulative (km)",
            ROUND("Total elevation (m)", 2) AS "Total elevation (m)",
            ROUND("Cumulative (elevation)", 2) AS "Cumulative (elevation)",
            ROUND("Moving time (hour)", 2) AS "Moving time (hour)",
            ROUND("Cumulative (hour)", 2) AS "Cumulative (hour)"
        FROM running
        WHERE CAST(strftime('%Y', "Date") AS INT) BETWEEN CAST(?2 AS INT) AND CAST(?3 AS INT)
            AND "Bike" LIKE ?4
        ORDER BY "Bike", "Date"
        "#,
        &[
            resolution.as_str().to_string(),
            start_year.to_string(),
            end_year.to_string(),
            format!("{}%", bike.unwrap_or_default()),
        ],
    )
    .await
}
