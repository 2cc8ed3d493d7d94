use chrono::{TimeZone, Utc};
use nexcard_panel::kpi::{Kpis, summarize_at};
use nexcard_panel::row::Row;

fn lead(date: &str) -> Row {
    [("Fecha", date), ("Nombre", "x")].into_iter().collect()
}

#[test]
fn test_recency_windows() {
    let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
    let rows = vec![
        lead("2024-03-20"),          // today
        lead("2024-03-15"),          // five and a half days ago
        lead("2024-03-01"),          // nineteen days ago
        lead("2024-01-01"),          // too old
        lead("sin fecha"),           // unparsable
    ];

    let kpis = summarize_at(&rows, Some("Fecha"), now);
    assert_eq!(
        kpis,
        Kpis {
            total: 5,
            today: 1,
            last_7_days: 2,
            last_30_days: 3,
        }
    );
}

#[test]
fn test_windows_are_inclusive() {
    let now = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
    let rows = vec![lead("2024-03-13"), lead("2024-02-19")];

    // Exactly 7 and exactly 30 days old
    let kpis = summarize_at(&rows, Some("Fecha"), now);
    assert_eq!(kpis.last_7_days, 1);
    assert_eq!(kpis.last_30_days, 2);
    assert_eq!(kpis.today, 0);
}

#[test]
fn test_without_date_column_only_total_counts() {
    let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
    let rows = vec![lead("2024-03-20"), lead("2024-03-19")];
    let kpis = summarize_at(&rows, None, now);
    assert_eq!(kpis.total, 2);
    assert_eq!((kpis.today, kpis.last_7_days, kpis.last_30_days), (0, 0, 0));
}

#[test]
fn test_empty_sheet() {
    let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
    assert_eq!(summarize_at(&[], Some("Fecha"), now), Kpis::default());
}
