use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Export representation of a stored report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AppError::ValidationError(format!(
                "Unsupported export format '{}'; expected json or csv",
                other
            ))),
        }
    }
}

/// `report_<id>_<YYYYMMDD>.<ext>`
pub fn export_filename(report_id: Uuid, date: DateTime<Utc>, format: ExportFormat) -> String {
    format!(
        "report_{}_{}.{}",
        report_id,
        date.format("%Y%m%d"),
        format.extension()
    )
}

/// Render a tabular payload as CSV.
///
/// Accepts an array of objects or an object whose `rows` field is one.
/// Columns are the first record's keys followed by keys first seen in later
/// records; missing cells are empty.
pub fn render_csv(payload: &Value) -> Result<String> {
    let records = tabular_records(payload)?;

    let mut columns: Vec<&str> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut out = String::new();
    write_row(&mut out, columns.iter().map(|c| escape_cell(c)));
    for record in &records {
        write_row(
            &mut out,
            columns
                .iter()
                .map(|column| escape_cell(&cell_text(record.get(*column)))),
        );
    }

    Ok(out)
}

fn tabular_records(payload: &Value) -> Result<Vec<&Map<String, Value>>> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(obj) => match obj.get("rows") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(AppError::UnprocessableExport(
                    "result is an object without a rows array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::UnprocessableExport(
                "result is not tabular".to_string(),
            ))
        }
    };

    if rows.is_empty() {
        return Err(AppError::UnprocessableExport("result has no rows".to_string()));
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            row.as_object().ok_or_else(|| {
                AppError::UnprocessableExport(format!("row {} is not an object", i))
            })
        })
        .collect()
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn write_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let line: Vec<String> = cells.collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_simple_table() {
        let csv = render_csv(&json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}])).unwrap();
        assert_eq!(csv, "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn test_engine_rows_shape() {
        let payload = json!({
            "columns": [{"name": "id"}],
            "rows": [{"id": "i-1", "running": true}]
        });
        assert_eq!(render_csv(&payload).unwrap(), "id,running\ni-1,true\n");
    }

    #[test]
    fn test_union_of_keys_keeps_cells_aligned() {
        let payload = json!([
            {"name": "web", "region": "us-east-1"},
            {"region": "eu-west-1", "tags": {"env": "prod"}, "name": "db"},
            {"name": "cache"}
        ]);

        let csv = render_csv(&payload).unwrap();
        assert_eq!(
            csv,
            "name,region,tags\nweb,us-east-1,\ndb,eu-west-1,\"{\"\"env\"\":\"\"prod\"\"}\"\ncache,,\n"
        );
    }

    #[test]
    fn test_special_characters_are_quoted() {
        let payload = json!([{"note": "a,b", "quote": "say \"hi\"", "multi": "x\ny", "none": null}]);
        let csv = render_csv(&payload).unwrap();
        assert_eq!(
            csv,
            "note,quote,multi,none\n\"a,b\",\"say \"\"hi\"\"\",\"x\ny\",\n"
        );
    }

    #[test]
    fn test_non_tabular_payloads_rejected() {
        for payload in [json!([]), json!({"count": 3}), json!("text"), json!([1, 2])] {
            let err = render_csv(&payload).unwrap_err();
            assert!(matches!(err, AppError::UnprocessableExport(_)), "{}", payload);
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_filename() {
        let id = Uuid::nil();
        let exported_on = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            export_filename(id, exported_on, ExportFormat::Csv),
            "report_00000000-0000-0000-0000-000000000000_20240309.csv"
        );
    }
}
