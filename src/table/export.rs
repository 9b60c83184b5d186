use std::path::{Path, PathBuf};

use crate::error::{QueryError, Result};
use crate::table::ResultTable;

/// File name offered for every table download.
pub const EXPORT_FILE_NAME: &str = "export.csv";

impl ResultTable {
    /// UTF-8 CSV with a header row. Nulls become empty fields.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        self.write_records(&mut wtr)?;
        wtr.into_inner()
            .map_err(|e| QueryError::Export(e.to_string()))
    }

    /// Write `export.csv` into `dir`, returning the full path.
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(EXPORT_FILE_NAME);
        let mut wtr = csv::Writer::from_path(&path)
            .map_err(|e| QueryError::Export(format!("Cannot create {}: {}", path.display(), e)))?;
        self.write_records(&mut wtr)?;
        wtr.flush().map_err(|e| QueryError::Export(e.to_string()))?;
        Ok(path)
    }

    fn write_records<W: std::io::Write>(&self, wtr: &mut csv::Writer<W>) -> Result<()> {
        wtr.write_record(self.columns().iter().map(|c| c.name.as_str()))
            .map_err(|e| QueryError::Export(e.to_string()))?;

        for row in self.rows() {
            wtr.write_record(row.iter().map(ToString::to_string))
                .map_err(|e| QueryError::Export(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::table::{Column, ColumnKind, ResultTable, Value};

    use super::*;

    fn table() -> ResultTable {
        ResultTable::new(
            vec![
                Column::new("ts", ColumnKind::Timestamp),
                Column::new("label", ColumnKind::Text),
                Column::new("tvl", ColumnKind::Float),
            ],
            vec![
                vec![
                    Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                    Value::from("sUSD, (Base)"),
                    Value::Float(1250.5),
                ],
                vec![
                    Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
                    Value::from("WETH (Arbitrum)"),
                    Value::Null,
                ],
            ],
        )
    }

    #[test]
    fn test_to_csv() {
        let csv = String::from_utf8(table().to_csv().unwrap()).unwrap();
        assert_eq!(
            csv,
            "ts,label,tvl\n2024-01-01 00:00:00,\"sUSD, (Base)\",1250.5\n2024-01-02 00:00:00,WETH (Arbitrum),\n"
        );
    }

    #[test]
    fn test_empty_table_has_header() {
        let empty = ResultTable::empty(table().columns().to_vec());
        assert_eq!(String::from_utf8(empty.to_csv().unwrap()).unwrap(), "ts,label,tvl\n");
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = table().write_csv(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), EXPORT_FILE_NAME);
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("ts,label,tvl\n"));
    }
}
