use std::io;
use std::path::{Path, PathBuf};

use crate::row::Row;

pub const CSV_MIME: &str = "text/csv;charset=utf-8";
#[cfg(feature = "web")]
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A file ready to be handed to the user
#[derive(Clone, Debug, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub mime: &'static str,
    pub content: Vec<u8>,
}

impl Download {
    /// Write the file to disk
    ///
    /// # Arguments
    /// * `target` - Destination path; `None` writes `file_name` in the working directory
    ///
    /// # Returns
    /// * `io::Result<PathBuf>` - Where the file landed, or the write error
    pub fn save(&self, target: Option<&Path>) -> io::Result<PathBuf> {
        let path = target.map_or_else(|| PathBuf::from(&self.file_name), Path::to_path_buf);
        std::fs::write(&path, &self.content)?;
        Ok(path)
    }
}

/// File name for an export of `company`'s leads
///
/// # Examples
/// ```
/// use nexcard_panel::downloader::export_file_name;
///
/// assert_eq!(export_file_name("acme", "csv"), "nexcard_acme_leads.csv");
/// assert_eq!(export_file_name("", "csv"), "nexcard_empresa_leads.csv");
/// ```
pub fn export_file_name(company: &str, extension: &str) -> String {
    let company = if company.is_empty() { "empresa" } else { company };
    format!("nexcard_{}_leads.{}", company, extension)
}

/// Quote a field if it contains a comma, a double quote or a newline
///
/// # Examples
/// ```
/// use nexcard_panel::downloader::escape_csv_field;
///
/// assert_eq!(escape_csv_field("plain"), "plain");
/// assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
/// assert_eq!(escape_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn escape_csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert the filtered rows to CSV over the given headers
///
/// The header row comes first, then one line per row in the order given.
/// Lines are joined with `\n` and there is no trailing newline.
///
/// # Arguments
/// * `headers` - Columns to write, in order
/// * `rows` - Rows to write; missing cells become empty fields
///
/// # Returns
/// * `String` - The CSV text
pub fn to_csv(headers: &[String], rows: &[&Row]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_csv_field(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            headers
                .iter()
                .map(|h| escape_csv_field(&row.display(h)))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// CSV download for `company`, or `None` when there is nothing to export
pub fn csv_download(company: &str, headers: &[String], rows: &[&Row]) -> Option<Download> {
    if rows.is_empty() {
        return None;
    }
    Some(Download {
        file_name: export_file_name(company, "csv"),
        mime: CSV_MIME,
        content: to_csv(headers, rows).into_bytes(),
    })
}

/// Convert the filtered rows to an XLSX workbook
///
/// All cells are written as text so values look exactly like the table.
///
/// # Arguments
/// * `headers` - Columns to write, in order
/// * `rows` - Rows to write below the header row
///
/// # Returns
/// * `Result<Vec<u8>, XlsxError>` - Workbook bytes or the writer's error
#[cfg(feature = "web")]
pub fn to_xlsx(headers: &[String], rows: &[&Row]) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (c, header) in headers.iter().enumerate() {
        worksheet.write_string(0, c as u16, header)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, header) in headers.iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, &row.display(header))?;
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

#[cfg(feature = "web")]
pub fn xlsx_download(
    company: &str,
    headers: &[String],
    rows: &[&Row],
) -> Result<Option<Download>, rust_xlsxwriter::XlsxError> {
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(Download {
        file_name: export_file_name(company, "xlsx"),
        mime: XLSX_MIME,
        content: to_xlsx(headers, rows)?,
    }))
}
