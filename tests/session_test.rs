use nexcard_panel::session::{
    ActiveSession, SessionError, SessionFile, StoredSession, is_token_message, normalize_company,
    resolve, share_link,
};
use tempfile::tempdir;

fn stored(token: Option<&str>, company: Option<&str>, alias: Option<&str>) -> StoredSession {
    StoredSession {
        token: token.map(str::to_string),
        empresa_id: company.map(str::to_string),
        empresa_alias: alias.map(str::to_string),
    }
}

#[test]
fn test_normalize_company() {
    assert_eq!(normalize_company("  TrampaClean "), Some("trampaclean".into()));
    assert_eq!(normalize_company("   "), None);
}

#[test]
fn test_requested_company_wins() {
    let s = stored(Some("tok"), Some("old"), None);
    let active = resolve(Some(" NEW "), None, &s).unwrap();
    assert_eq!(active.company, "new");
    assert_eq!(active.token, "tok");
}

#[test]
fn test_falls_back_to_stored_company() {
    let s = stored(Some("tok"), Some("Acme"), Some("Acme Inc"));
    let active = resolve(Some(""), None, &s).unwrap();
    assert_eq!(active.company, "acme");
    assert_eq!(active.display_name(), "Acme Inc");
}

#[test]
fn test_missing_token_comes_first() {
    let s = stored(None, None, None);
    assert!(matches!(resolve(Some("acme"), None, &s), Err(SessionError::MissingToken)));

    let blank = stored(Some(""), Some("acme"), None);
    assert!(matches!(resolve(None, None, &blank), Err(SessionError::MissingToken)));
}

#[test]
fn test_missing_company() {
    let s = stored(Some("tok"), None, None);
    let err = resolve(None, None, &s).unwrap_err();
    assert!(matches!(err, SessionError::MissingCompany));
    assert_eq!(err.to_string(), "empresa_id required.");
}

#[test]
fn test_display_name_defaults_to_company() {
    let active = ActiveSession {
        token: "t".into(),
        company: "acme".into(),
        alias: None,
    };
    assert_eq!(active.display_name(), "acme");
}

#[test]
fn test_token_messages() {
    assert!(is_token_message("Token inválido"));
    assert!(is_token_message("expired TOKEN"));
    assert!(!is_token_message("not allowed"));
}

#[test]
fn test_share_link() {
    assert_eq!(
        share_link("https://panel.example.com", "acme"),
        "https://panel.example.com/dashboard?empresa_id=acme"
    );
}

#[test]
fn test_session_file_round_trip() {
    let dir = tempdir().unwrap();
    let file = SessionFile::new(dir.path().join("nested").join("session.json"));

    // A missing file is an empty session
    assert_eq!(file.load().unwrap(), StoredSession::default());

    let mut session = stored(Some("tok"), None, None);
    session.remember(&ActiveSession {
        token: "tok".into(),
        company: "acme".into(),
        alias: Some("Acme".into()),
    });
    file.save(&session).unwrap();
    assert_eq!(file.load().unwrap(), stored(Some("tok"), Some("acme"), Some("Acme")));

    // Logging out keeps the company
    file.clear_token().unwrap();
    assert_eq!(file.load().unwrap(), stored(None, Some("acme"), Some("Acme")));
}

#[test]
fn test_corrupt_session_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(
        SessionFile::new(&path).load(),
        Err(SessionError::Format(_))
    ));
}
