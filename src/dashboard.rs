use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::columns::ColumnRoles;
use crate::downloader::{self, Download};
use crate::editor::{self, DetailField, EditField};
use crate::gateway::{GatewayError, Identity, LeadSheet, LeadsBackend, SaveOutcome};
use crate::kpi::{self, Kpis};
use crate::row::Row;
use crate::session::{self, ActiveSession};
use crate::view::{self, PageWindow, ViewState};

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Gateway(GatewayError),

    /// The backend rejected the token; the caller must forget it and log in again
    #[error("{0}")]
    SessionExpired(String),

    #[error("Record not found.")]
    NotFound,

    #[error("Missing ID.")]
    MissingId,

    #[error("empresa_id required.")]
    MissingCompany,

    #[error("No data to export.")]
    NothingToExport,

    #[cfg(feature = "web")]
    #[error("Could not build the spreadsheet: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl From<GatewayError> for DashboardError {
    fn from(e: GatewayError) -> Self {
        let message = e.to_string();
        if session::is_token_message(&message) {
            DashboardError::SessionExpired(message)
        } else {
            DashboardError::Gateway(e)
        }
    }
}

impl DashboardError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, DashboardError::SessionExpired(_))
    }
}

/// Result of a write that succeeded remotely
///
/// The write itself went through; `reload` reports whether the follow-up
/// refresh did too.
#[derive(Debug)]
pub struct WriteOutcome<T> {
    pub value: T,
    pub reload: Result<(), DashboardError>,
}

/// A delete the user has been asked to confirm
///
/// Only [`Dashboard::prepare_delete`] creates one, so a delete cannot be sent
/// for a row that was never looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteRequest {
    id: String,
}

impl DeleteRequest {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Current page of the filtered view
#[derive(Debug, Serialize)]
pub struct PageView<'a> {
    pub window: PageWindow,
    pub rows: Vec<&'a Row>,
}

/// Owner of the session, the fetched sheet, the column roles and the view
///
/// Reads go through the pure functions in `columns`, `view`, `kpi`, `editor`
/// and `downloader`. Only the methods here mutate state.
pub struct Dashboard<B> {
    backend: B,
    session: ActiveSession,
    page_size: usize,
    identity: Option<Identity>,
    headers: Vec<String>,
    rows: Vec<Row>,
    roles: ColumnRoles,
    visible: Vec<String>,
    view: ViewState,
    filtered: Vec<usize>,
    salesperson_options: Vec<String>,
    interest_options: Vec<String>,
    loaded: bool,
}

impl<B: LeadsBackend> Dashboard<B> {
    pub fn new(backend: B, session: ActiveSession, page_size: usize) -> Self {
        Dashboard {
            backend,
            session,
            page_size: page_size.max(1),
            identity: None,
            headers: Vec::new(),
            rows: Vec::new(),
            roles: ColumnRoles::default(),
            visible: Vec::new(),
            view: ViewState::new(),
            filtered: Vec::new(),
            salesperson_options: Vec::new(),
            interest_options: Vec::new(),
            loaded: false,
        }
    }

    pub fn session(&self) -> &ActiveSession {
        &self.session
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn roles(&self) -> &ColumnRoles {
        &self.roles
    }

    pub fn visible_headers(&self) -> &[String] {
        &self.visible
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn salesperson_options(&self) -> &[String] {
        &self.salesperson_options
    }

    pub fn interest_options(&self) -> &[String] {
        &self.interest_options
    }

    /// Validate the session and fetch the company's sheet again
    ///
    /// On failure the previously loaded rows stay in place.
    pub async fn reload(&mut self) -> Result<(), DashboardError> {
        info!("Loading leads for {}", self.session.company);
        let identity = self.backend.authenticate(&self.session.token).await?;
        info!("Signed in as {}", identity.banner());
        self.identity = Some(identity);

        let sheet = self
            .backend
            .list_rows(&self.session.token, &self.session.company)
            .await?;
        self.load_sheet(sheet);
        Ok(())
    }

    /// Replace the row store with a freshly fetched sheet
    pub fn load_sheet(&mut self, sheet: LeadSheet) {
        self.roles = ColumnRoles::detect(&sheet.headers);
        self.visible = self.roles.visible_headers(&sheet.headers);
        self.headers = sheet.headers;
        self.rows = sheet.rows;

        self.salesperson_options =
            view::filter_options(&self.rows, self.roles.salesperson.as_deref());
        self.interest_options = view::filter_options(&self.rows, self.roles.interest.as_deref());
        self.view.salesperson =
            view::retain_selection(&self.salesperson_options, &self.view.salesperson);
        self.view.interest = view::retain_selection(&self.interest_options, &self.view.interest);

        self.loaded = true;
        info!(
            "Loaded {} rows with {} columns for {}",
            self.rows.len(),
            self.headers.len(),
            self.session.company
        );
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered =
            view::filter_indices(&self.rows, &self.visible, &self.roles, &self.view, &Local);
        self.view.page = 1;
    }

    pub fn set_search(&mut self, text: &str) {
        self.view.search = text.to_string();
        self.refilter();
    }

    pub fn set_salesperson_filter(&mut self, value: &str) {
        self.view.salesperson = value.trim().to_string();
        self.refilter();
    }

    pub fn set_interest_filter(&mut self, value: &str) {
        self.view.interest = value.trim().to_string();
        self.refilter();
    }

    /// Set search and both filters at once; the page resets only on change
    pub fn set_view(&mut self, search: &str, salesperson: &str, interest: &str) {
        let changed = self.view.search != search
            || self.view.salesperson != salesperson.trim()
            || self.view.interest != interest.trim();
        if changed {
            self.view.search = search.to_string();
            self.view.salesperson = salesperson.trim().to_string();
            self.view.interest = interest.trim().to_string();
            self.refilter();
        }
    }

    pub fn clear_filters(&mut self) {
        self.view.search.clear();
        self.view.salesperson.clear();
        self.view.interest.clear();
        self.refilter();
    }

    pub fn page_window(&self) -> PageWindow {
        view::paginate(self.filtered.len(), self.view.page, self.page_size)
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.view.page = view::paginate(self.filtered.len(), page, self.page_size).number;
    }

    pub fn next_page(&mut self) {
        self.go_to_page(self.view.page + 1);
    }

    pub fn prev_page(&mut self) {
        self.go_to_page(self.view.page.saturating_sub(1));
    }

    pub fn filtered_rows(&self) -> Vec<&Row> {
        self.filtered.iter().map(|&i| &self.rows[i]).collect()
    }

    pub fn page(&self) -> PageView<'_> {
        let window = self.page_window();
        let rows = self.filtered[window.start..window.end]
            .iter()
            .map(|&i| &self.rows[i])
            .collect();
        PageView { window, rows }
    }

    /// Recency counters over the whole sheet, ignoring filters
    pub fn kpis(&self) -> Kpis {
        kpi::summarize(&self.rows, self.roles.date.as_deref())
    }

    /// Trimmed ID of a row; empty when the sheet has no ID column
    pub fn row_id(&self, row: &Row) -> String {
        self.roles
            .id
            .as_deref()
            .map(|h| row.display(h).trim().to_string())
            .unwrap_or_default()
    }

    pub fn find_row(&self, id: &str) -> Option<&Row> {
        let id = id.trim();
        let header = self.roles.id.as_deref()?;
        if id.is_empty() {
            return None;
        }
        self.rows.iter().find(|r| r.display(header).trim() == id)
    }

    pub fn detail(&self, id: &str) -> Result<Vec<DetailField>, DashboardError> {
        let row = self.find_row(id).ok_or(DashboardError::NotFound)?;
        Ok(editor::detail_fields(row, &self.headers))
    }

    pub fn edit_form(&self, id: &str) -> Result<Vec<EditField>, DashboardError> {
        let row = self.find_row(id).ok_or(DashboardError::NotFound)?;
        Ok(editor::edit_fields(row, &self.headers, self.roles.id.as_deref()))
    }

    /// Save edited values of row `id`, then reload
    ///
    /// Nothing is sent when the row is not in the store. If the backend refuses
    /// the save the store is left untouched.
    pub async fn save_edit<I>(
        &mut self,
        id: &str,
        edits: I,
    ) -> Result<WriteOutcome<SaveOutcome>, DashboardError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let row = self.find_row(id).ok_or(DashboardError::NotFound)?;
        let updated = editor::merge_edits(row, edits, self.roles.id.as_deref());

        let outcome = self
            .backend
            .save_row(&self.session.token, &self.session.company, &updated)
            .await?;
        info!("Saved lead {} ({})", outcome.id, outcome.mode);

        let reload = self.reload().await;
        if let Err(e) = &reload {
            warn!("Reload after save failed: {}", e);
        }
        Ok(WriteOutcome {
            value: outcome,
            reload,
        })
    }

    /// First half of a delete: check the row exists and hand back a request to confirm
    pub fn prepare_delete(&self, id: &str) -> Result<DeleteRequest, DashboardError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DashboardError::MissingId);
        }
        self.find_row(id).ok_or(DashboardError::NotFound)?;
        Ok(DeleteRequest { id: id.to_string() })
    }

    /// Send a confirmed delete, then reload
    ///
    /// A refusal leaves the row in the store and skips the reload.
    pub async fn delete(
        &mut self,
        request: DeleteRequest,
    ) -> Result<WriteOutcome<()>, DashboardError> {
        self.backend
            .delete_row(&self.session.token, &self.session.company, &request.id)
            .await?;
        info!("Deleted lead {}", request.id);

        let reload = self.reload().await;
        if let Err(e) = &reload {
            warn!("Reload after delete failed: {}", e);
        }
        Ok(WriteOutcome { value: (), reload })
    }

    pub fn export_csv(&self) -> Result<Download, DashboardError> {
        downloader::csv_download(&self.session.company, &self.visible, &self.filtered_rows())
            .ok_or(DashboardError::NothingToExport)
    }

    #[cfg(feature = "web")]
    pub fn export_xlsx(&self) -> Result<Download, DashboardError> {
        downloader::xlsx_download(&self.session.company, &self.visible, &self.filtered_rows())?
            .ok_or(DashboardError::NothingToExport)
    }

    /// Point the dashboard at another company and drop the loaded sheet
    pub fn switch_company(
        &mut self,
        company: &str,
        alias: Option<&str>,
    ) -> Result<(), DashboardError> {
        let company = session::normalize_company(company).ok_or(DashboardError::MissingCompany)?;
        info!("Switching company to {}", company);
        self.session.company = company;
        self.session.alias = alias.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string);
        self.headers.clear();
        self.rows.clear();
        self.roles = ColumnRoles::default();
        self.visible.clear();
        self.filtered.clear();
        self.salesperson_options.clear();
        self.interest_options.clear();
        self.view = ViewState::new();
        self.loaded = false;
        Ok(())
    }

    pub fn set_alias(&mut self, alias: Option<&str>) {
        if let Some(alias) = alias.map(str::trim).filter(|a| !a.is_empty()) {
            self.session.alias = Some(alias.to_string());
        }
    }

    pub fn share_link(&self, public_url: &str) -> String {
        session::share_link(public_url, &self.session.company)
    }
}
