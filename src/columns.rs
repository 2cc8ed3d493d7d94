use serde::Serialize;

pub const ID_ALIASES: &[&str] = &["ID", "Id", "id"];

pub const DATE_ALIASES: &[&str] = &[
    "Fecha",
    "fecha",
    "Timestamp",
    "timestamp",
    "created_at",
    "Created At",
];

pub const SALESPERSON_ALIASES: &[&str] = &["Vendedor", "vendedor", "Seller", "seller"];

pub const INTEREST_ALIASES: &[&str] = &[
    "Interés",
    "interés",
    "Interes",
    "interes",
    "Intereses",
    "intereses",
    "Servicio",
    "servicio",
];

/// Semantic purpose a column can serve
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Id,
    Date,
    Salesperson,
    Interest,
}

impl Role {
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Role::Id => ID_ALIASES,
            Role::Date => DATE_ALIASES,
            Role::Salesperson => SALESPERSON_ALIASES,
            Role::Interest => INTEREST_ALIASES,
        }
    }
}

/// Header bound to each role for the current sheet, if any
///
/// Each company names its columns differently, so roles are found through a
/// short alias list. Matching is trimmed and case-insensitive. Accents are not
/// folded: accented and plain spellings are listed side by side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ColumnRoles {
    pub id: Option<String>,
    pub date: Option<String>,
    pub salesperson: Option<String>,
    pub interest: Option<String>,
}

impl ColumnRoles {
    /// Bind every role against `headers`
    ///
    /// # Arguments
    /// * `headers` - Sheet headers in the order the backend sent them
    ///
    /// # Returns
    /// * `ColumnRoles` - The first matching header per role, or `None`
    pub fn detect(headers: &[String]) -> Self {
        let bind = |role: Role| find_header(headers, role.aliases()).map(str::to_string);
        ColumnRoles {
            id: bind(Role::Id),
            date: bind(Role::Date),
            salesperson: bind(Role::Salesperson),
            interest: bind(Role::Interest),
        }
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Id => self.id.as_deref(),
            Role::Date => self.date.as_deref(),
            Role::Salesperson => self.salesperson.as_deref(),
            Role::Interest => self.interest.as_deref(),
        }
    }

    /// Headers shown in the table and export: everything except the ID column
    pub fn visible_headers(&self, headers: &[String]) -> Vec<String> {
        headers
            .iter()
            .filter(|h| Some(h.as_str()) != self.id.as_deref())
            .cloned()
            .collect()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// First candidate (in priority order) that matches a header wins
///
/// Returns the header as it appears in `headers`, not the candidate spelling.
pub fn find_header<'a>(headers: &'a [String], candidates: &[&str]) -> Option<&'a str> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
    candidates.iter().find_map(|candidate| {
        let wanted = normalize(candidate);
        normalized
            .iter()
            .position(|h| *h == wanted)
            .map(|idx| headers[idx].as_str())
    })
}
