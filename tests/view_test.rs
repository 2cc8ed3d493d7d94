use chrono::Utc;
use nexcard_panel::columns::ColumnRoles;
use nexcard_panel::row::Row;
use nexcard_panel::view::{
    ViewState, apply_filters, collate, filter_indices, filter_options, paginate, retain_selection,
    total_pages,
};

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs.iter().copied().collect()
}

/// The two-lead sheet used throughout
fn scenario() -> (Vec<String>, Vec<Row>) {
    let h = headers(&["ID", "Fecha", "Nombre", "Vendedor"]);
    let rows = vec![
        row(&[("ID", "2"), ("Fecha", "2024-01-01"), ("Nombre", "Bea"), ("Vendedor", "Ana")]),
        row(&[("ID", "1"), ("Fecha", "2024-01-10"), ("Nombre", "Ana"), ("Vendedor", "Luis")]),
    ];
    (h, rows)
}

fn ids(rows: &[&Row]) -> Vec<String> {
    rows.iter().map(|r| r.display("ID")).collect()
}

#[test]
fn test_scenario_order_and_visible_headers() {
    let (h, rows) = scenario();
    let roles = ColumnRoles::detect(&h);
    let visible = roles.visible_headers(&h);
    assert_eq!(visible, headers(&["Fecha", "Nombre", "Vendedor"]));

    let shown = apply_filters(&rows, &visible, &roles, &ViewState::new(), &Utc);
    assert_eq!(ids(&shown), vec!["1", "2"], "Newest lead must come first");
}

#[test]
fn test_scenario_salesperson_filter() {
    let (h, rows) = scenario();
    let roles = ColumnRoles::detect(&h);
    let visible = roles.visible_headers(&h);
    let state = ViewState {
        salesperson: "Ana".into(),
        ..ViewState::new()
    };

    // Lead 1 is *named* Ana but sold by Luis
    let shown = apply_filters(&rows, &visible, &roles, &state, &Utc);
    assert_eq!(ids(&shown), vec!["2"]);
}

#[test]
fn test_unparsable_dates_sort_last_and_keep_store_order() {
    let h = headers(&["Fecha", "Nombre"]);
    let rows = vec![
        row(&[("Fecha", "???"), ("Nombre", "first")]),
        row(&[("Fecha", "2024-02-01"), ("Nombre", "newest")]),
        row(&[("Fecha", ""), ("Nombre", "second")]),
        row(&[("Fecha", "2023-02-01"), ("Nombre", "older")]),
    ];
    let roles = ColumnRoles::detect(&h);
    let order = filter_indices(&rows, &h, &roles, &ViewState::new(), &Utc);
    assert_eq!(order, vec![1, 3, 0, 2]);
}

#[test]
fn test_without_date_column_store_order_is_kept() {
    let h = headers(&["Nombre"]);
    let rows = vec![row(&[("Nombre", "b")]), row(&[("Nombre", "a")])];
    let roles = ColumnRoles::detect(&h);
    assert_eq!(
        filter_indices(&rows, &h, &roles, &ViewState::new(), &Utc),
        vec![0, 1]
    );
}

#[test]
fn test_search_is_case_insensitive_over_visible_columns() {
    let (h, rows) = scenario();
    let roles = ColumnRoles::detect(&h);
    let visible = roles.visible_headers(&h);

    let search = |q: &str| {
        let state = ViewState {
            search: q.into(),
            ..ViewState::new()
        };
        ids(&apply_filters(&rows, &visible, &roles, &state, &Utc))
    };

    assert_eq!(search("LUIS"), vec!["1"]);
    assert_eq!(search("  bea "), vec!["2"], "The query is trimmed");
    // "Ana" appears as a name in lead 1 and as a salesperson in lead 2
    assert_eq!(search("ana"), vec!["1", "2"]);
    assert_eq!(search("zzz"), Vec::<String>::new());
}

#[test]
fn test_every_search_result_contains_the_query() {
    let h = headers(&["ID", "Nombre", "Correo"]);
    let rows: Vec<Row> = (0..30)
        .map(|i| {
            let id = i.to_string();
            let name = format!("Cliente {}", i);
            let mail = format!("c{}@mail.com", i % 4);
            row(&[("ID", id.as_str()), ("Nombre", name.as_str()), ("Correo", mail.as_str())])
        })
        .collect();
    let roles = ColumnRoles::detect(&h);
    let visible = roles.visible_headers(&h);
    let state = ViewState {
        search: "c1@".into(),
        ..ViewState::new()
    };

    let kept = filter_indices(&rows, &visible, &roles, &state, &Utc);
    for (i, r) in rows.iter().enumerate() {
        let hit = visible.iter().any(|v| r.display(v).to_lowercase().contains("c1@"));
        assert_eq!(kept.contains(&i), hit, "Row {} misclassified", i);
    }
}

#[test]
fn test_filters_compare_trimmed_values() {
    let h = headers(&["Vendedor", "Servicio"]);
    let rows = vec![
        row(&[("Vendedor", " Ana "), ("Servicio", "Web")]),
        row(&[("Vendedor", "Ana"), ("Servicio", "SEO")]),
        row(&[("Vendedor", "Luis"), ("Servicio", "Web")]),
    ];
    let roles = ColumnRoles::detect(&h);
    let state = ViewState {
        salesperson: "Ana".into(),
        interest: "Web".into(),
        ..ViewState::new()
    };
    assert_eq!(filter_indices(&rows, &h, &roles, &state, &Utc), vec![0]);
}

#[test]
fn test_filter_options_are_distinct_trimmed_and_collated() {
    let h = headers(&["Vendedor"]);
    let rows = vec![
        row(&[("Vendedor", "beto")]),
        row(&[("Vendedor", " Álvaro")]),
        row(&[("Vendedor", "")]),
        row(&[("Vendedor", "Carla")]),
        row(&[("Vendedor", "beto ")]),
        row(&[("Vendedor", "alba")]),
    ];
    assert_eq!(
        filter_options(&rows, Some("Vendedor")),
        vec!["alba", "Álvaro", "beto", "Carla"]
    );
    assert!(filter_options(&rows, None).is_empty());
}

#[test]
fn test_collate_orders_case_variants_deterministically() {
    use std::cmp::Ordering;
    assert_eq!(collate("a", "B"), Ordering::Less);
    assert_eq!(collate("é", "f"), Ordering::Less);
    assert_ne!(collate("Ana", "ana"), Ordering::Equal);
}

#[test]
fn test_retain_selection() {
    let options = vec!["Ana".to_string(), "Luis".to_string()];
    assert_eq!(retain_selection(&options, "Luis"), "Luis");
    assert_eq!(retain_selection(&options, "Pedro"), "");
}

#[test]
fn test_total_pages() {
    assert_eq!(total_pages(0, 20), 1);
    assert_eq!(total_pages(20, 20), 1);
    assert_eq!(total_pages(21, 20), 2);
    assert_eq!(total_pages(5, 0), 5, "Page size is at least one");
}

#[test]
fn test_paginate_clamps_requested_page() {
    let window = paginate(45, 9, 20);
    assert_eq!(window.number, 3);
    assert_eq!((window.start, window.end), (40, 45));
    assert!(window.has_prev());
    assert!(!window.has_next());

    let window = paginate(45, 0, 20);
    assert_eq!(window.number, 1);
    assert_eq!((window.start, window.end), (0, 20));

    let empty = paginate(0, 3, 20);
    assert_eq!(empty.number, 1);
    assert_eq!(empty.total_pages, 1);
    assert_eq!((empty.start, empty.end), (0, 0));
}

#[test]
fn test_pages_cover_every_result_once() {
    for count in [0usize, 1, 19, 20, 21, 57] {
        let pages = total_pages(count, 20);
        let covered: usize = (1..=pages)
            .map(|p| {
                let w = paginate(count, p, 20);
                w.end - w.start
            })
            .sum();
        assert_eq!(covered, count);
    }
}

#[test]
fn test_id_column_is_not_searched() {
    let h = headers(&["ID", "Nombre"]);
    let rows = vec![row(&[("ID", "777"), ("Nombre", "Ana")])];
    let roles = ColumnRoles::detect(&h);
    let visible = roles.visible_headers(&h);
    let state = ViewState {
        search: "777".into(),
        ..ViewState::new()
    };
    assert!(filter_indices(&rows, &visible, &roles, &state, &Utc).is_empty());
}
