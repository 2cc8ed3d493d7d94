use nexcard_panel::downloader::{CSV_MIME, csv_download, to_csv};
use nexcard_panel::row::{Row, Value};

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_csv_reads_back_with_a_standard_reader() {
    let h = headers(&["Nombre", "Nota, extra", "Monto"]);
    let mut tricky = Row::new();
    tricky.set("Nombre", "Pérez, \"Pepe\"");
    tricky.set("Nota, extra", "línea uno\nlínea dos");
    tricky.set("Monto", Value::Number(1500.0));
    let mut plain = Row::new();
    plain.set("Nombre", "Ana");
    // "Nota, extra" missing, "Monto" null
    plain.set("Monto", Value::Null);

    let rows = vec![&tricky, &plain];
    let csv_text = to_csv(&h, &rows);
    assert!(!csv_text.ends_with('\n'), "No trailing newline");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());
    let read_headers: Vec<String> = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(read_headers, h);

    let records: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    assert_eq!(
        records,
        vec![
            vec![
                "Pérez, \"Pepe\"".to_string(),
                "línea uno\nlínea dos".to_string(),
                "1500".to_string()
            ],
            vec!["Ana".to_string(), String::new(), String::new()],
        ]
    );
}

#[test]
fn test_csv_layout() {
    let h = headers(&["A", "B"]);
    let row: Row = [("A", "1"), ("B", "x\"y")].into_iter().collect();
    assert_eq!(to_csv(&h, &[&row]), "A,B\n1,\"x\"\"y\"");
}

#[test]
fn test_download_metadata() {
    let h = headers(&["A"]);
    let row: Row = [("A", "1")].into_iter().collect();

    let download = csv_download("trampaclean", &h, &[&row]).unwrap();
    assert_eq!(download.file_name, "nexcard_trampaclean_leads.csv");
    assert_eq!(download.mime, CSV_MIME);
    assert_eq!(download.content, b"A\n1".to_vec());

    let unnamed = csv_download("", &h, &[&row]).unwrap();
    assert_eq!(unnamed.file_name, "nexcard_empresa_leads.csv");
}

#[test]
fn test_save_writes_to_the_chosen_path() {
    let dir = tempfile::tempdir().unwrap();
    let h = headers(&["A"]);
    let row: Row = [("A", "1")].into_iter().collect();
    let download = csv_download("acme", &h, &[&row]).unwrap();

    let target = dir.path().join("leads.csv");
    let written = download.save(Some(&target)).unwrap();
    assert_eq!(written, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"A\n1".to_vec());
}

#[test]
fn test_save_into_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = headers(&["A"]);
    let row: Row = [("A", "1")].into_iter().collect();
    let download = csv_download("acme", &h, &[&row]).unwrap();

    let target = dir.path().join("no").join("such").join("dir.csv");
    let err = download.save(Some(&target)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    assert!(!target.exists());
}

#[test]
fn test_nothing_to_export() {
    assert!(csv_download("acme", &headers(&["A"]), &[]).is_none());
}

#[cfg(feature = "web")]
#[test]
fn test_xlsx_download() {
    use nexcard_panel::downloader::{XLSX_MIME, xlsx_download};

    let h = headers(&["A"]);
    let row: Row = [("A", "1")].into_iter().collect();
    let download = xlsx_download("acme", &h, &[&row]).unwrap().unwrap();
    assert_eq!(download.file_name, "nexcard_acme_leads.xlsx");
    assert_eq!(download.mime, XLSX_MIME);
    // XLSX files are zip archives
    assert!(download.content.starts_with(b"PK"));

    assert!(xlsx_download("acme", &h, &[]).unwrap().is_none());
}
