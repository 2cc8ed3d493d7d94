use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::dashboard::{Dashboard, DashboardError};
use crate::downloader::Download;
use crate::editor::{EditField, FieldKind};
use crate::gateway::{GatewayError, HttpGateway, LeadsBackend};
use crate::session::{
    self, ALIAS_KEY, ActiveSession, EMPRESA_KEY, SessionError, StoredSession, TOKEN_KEY,
};

type SharedDashboard = Arc<tokio::sync::Mutex<Dashboard<HttpGateway>>>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("Render error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Shared server state: one dashboard per token and company
///
/// Every page is a handlebars template and every action is a plain form post
/// followed by a redirect that carries the outcome in a `notice` parameter.
pub struct AppState {
    config: Config,
    gateway: HttpGateway,
    templates: Handlebars<'static>,
    dashboards: Mutex<HashMap<(String, String), SharedDashboard>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let gateway =
            HttpGateway::with_timeout(config.api_base.clone(), config.timeout)?.jsonp(config.jsonp);
        Ok(AppState {
            config,
            gateway,
            templates: templates()?,
            dashboards: Mutex::new(HashMap::new()),
        })
    }

    fn dashboard(&self, session: &ActiveSession) -> SharedDashboard {
        let mut dashboards = self.dashboards.lock().unwrap_or_else(PoisonError::into_inner);
        dashboards
            .entry((session.token.clone(), session.company.clone()))
            .or_insert_with(|| {
                info!("Opening dashboard for {}", session.company);
                Arc::new(tokio::sync::Mutex::new(Dashboard::new(
                    self.gateway.clone(),
                    session.clone(),
                    self.config.page_size,
                )))
            })
            .clone()
    }

    /// Drop the dashboard for `session` unless its sheet was ever fetched
    ///
    /// Keeps a failed first load from leaving an entry behind for every
    /// company id someone tries.
    fn discard_unloaded(&self, session: &ActiveSession, dashboard: &Dashboard<HttpGateway>) {
        if dashboard.is_loaded() {
            return;
        }
        let mut dashboards = self.dashboards.lock().unwrap_or_else(PoisonError::into_inner);
        dashboards.remove(&(session.token.clone(), session.company.clone()));
    }

    /// Number of dashboards currently held in memory
    pub fn open_dashboards(&self) -> usize {
        self.dashboards.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every dashboard opened with `token`
    fn forget_token(&self, token: &str) {
        let mut dashboards = self.dashboards.lock().unwrap_or_else(PoisonError::into_inner);
        dashboards.retain(|(t, _), _| t != token);
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Html<String>, AppError> {
        Ok(Html(self.templates.render(name, data)?))
    }
}

fn templates() -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut hb = Handlebars::new();
    hb.register_partial("header", include_str!("./templates/header.hbs"))?;
    hb.register_partial("footer", include_str!("./templates/footer.hbs"))?;
    hb.register_template_string("login", include_str!("./templates/login.hbs"))?;
    hb.register_template_string("company", include_str!("./templates/company.hbs"))?;
    hb.register_template_string("dashboard", include_str!("./templates/dashboard.hbs"))?;
    hb.register_template_string("detail", include_str!("./templates/detail.hbs"))?;
    hb.register_template_string("edit", include_str!("./templates/edit.hbs"))?;
    hb.register_template_string("delete", include_str!("./templates/delete.hbs"))?;
    Ok(hb)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/login", get(login_page).post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/dashboard", get(dashboard_page))
        .route("/company", get(company_page).post(handle_company))
        .route("/lead/:id", get(lead_detail))
        .route("/lead/:id/edit", get(edit_page).post(handle_edit))
        .route("/lead/:id/delete", get(delete_page).post(handle_delete))
        .route("/export.csv", get(export_csv))
        .route("/export.xlsx", get(export_xlsx))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    println!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// Cookie values are percent-encoded so aliases with spaces or accents survive

fn cookie(key: &'static str, value: &str) -> Cookie<'static> {
    Cookie::build((key, urlencoding::encode(value).into_owned()))
        .path("/")
        .http_only(true)
        .build()
}

fn forget(jar: CookieJar, key: &'static str) -> CookieJar {
    jar.remove(Cookie::build(key).path("/"))
}

fn cookie_value(jar: &CookieJar, key: &str) -> Option<String> {
    let raw = jar.get(key)?.value().to_string();
    Some(urlencoding::decode(&raw).map(|v| v.into_owned()).unwrap_or(raw))
}

fn stored_session(jar: &CookieJar) -> StoredSession {
    StoredSession {
        token: cookie_value(jar, TOKEN_KEY),
        empresa_id: cookie_value(jar, EMPRESA_KEY),
        empresa_alias: cookie_value(jar, ALIAS_KEY),
    }
}

fn remember(jar: CookieJar, session: &ActiveSession) -> CookieJar {
    let jar = jar.add(cookie(EMPRESA_KEY, &session.company));
    match &session.alias {
        Some(alias) => jar.add(cookie(ALIAS_KEY, alias)),
        None => jar,
    }
}

fn with_notice(path: &str, message: &str) -> String {
    format!("{}?notice={}", path, urlencoding::encode(message))
}

fn lead_path(id: &str, suffix: &str) -> String {
    format!("/lead/{}{}", urlencoding::encode(id), suffix)
}

/// Resolve the session from cookies, or the redirect that fixes what is missing
fn require_session(
    jar: &CookieJar,
    company: Option<&str>,
    alias: Option<&str>,
) -> Result<ActiveSession, Response> {
    match session::resolve(company, alias, &stored_session(jar)) {
        Ok(session) => Ok(session),
        Err(SessionError::MissingCompany) => Err(Redirect::to("/company").into_response()),
        Err(_) => Err(Redirect::to("/login").into_response()),
    }
}

/// The backend no longer accepts the token: forget it and go back to login
fn session_expired(
    state: &AppState,
    jar: CookieJar,
    session: &ActiveSession,
    message: &str,
) -> Response {
    warn!("Session for {} rejected: {}", session.company, message);
    state.forget_token(&session.token);
    (forget(jar, TOKEN_KEY), Redirect::to(&with_notice("/login", message))).into_response()
}

fn failure(
    state: &AppState,
    jar: CookieJar,
    session: &ActiveSession,
    e: DashboardError,
    back_to: &str,
) -> Response {
    if e.is_session_expired() {
        session_expired(state, jar, session, &e.to_string())
    } else {
        (jar, Redirect::to(&with_notice(back_to, &e.to_string()))).into_response()
    }
}

/// Session plus a dashboard whose sheet has been fetched at least once
async fn open(
    state: &AppState,
    jar: &CookieJar,
) -> Result<(ActiveSession, SharedDashboard), Response> {
    let session = require_session(jar, None, None)?;
    let shared = state.dashboard(&session);
    {
        let mut dashboard = shared.lock().await;
        if !dashboard.is_loaded() {
            if let Err(e) = dashboard.reload().await {
                state.discard_unloaded(&session, &dashboard);
                return Err(failure(state, jar.clone(), &session, e, "/dashboard"));
            }
        }
    }
    Ok((session, shared))
}

#[derive(Deserialize, Default)]
struct NoticeQuery {
    notice: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    token: String,
    #[serde(default)]
    empresa_id: String,
    #[serde(default)]
    empresa_alias: String,
}

#[derive(Deserialize)]
struct CompanyForm {
    empresa_id: String,
    #[serde(default)]
    empresa_alias: String,
}

#[derive(Deserialize, Default)]
struct DashboardQuery {
    empresa_id: Option<String>,
    empresa_alias: Option<String>,
    #[serde(default)]
    q: String,
    #[serde(default)]
    vendedor: String,
    #[serde(default)]
    interes: String,
    page: Option<usize>,
    refresh: Option<String>,
    notice: Option<String>,
    /// Present when the filter form was submitted
    view: Option<String>,
}

async fn serve_root(jar: CookieJar) -> Redirect {
    if cookie_value(&jar, TOKEN_KEY).is_some() {
        Redirect::to("/dashboard")
    } else {
        Redirect::to("/login")
    }
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<NoticeQuery>,
) -> Result<Html<String>, AppError> {
    state.render(
        "login",
        &json!({
            "notice": query.notice,
            "empresa_id": cookie_value(&jar, EMPRESA_KEY),
        }),
    )
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let token = form.token.trim();
    let retry = |message: String| -> Result<Response, AppError> {
        let page = state.render(
            "login",
            &json!({ "notice": message, "empresa_id": form.empresa_id }),
        )?;
        Ok((StatusCode::UNAUTHORIZED, page).into_response())
    };
    if token.is_empty() {
        return retry(String::from("Enter your session token."));
    }

    let identity = match state.gateway.authenticate(token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Login rejected: {}", e);
            return retry(e.to_string());
        }
    };
    info!("Signed in as {}", identity.banner());

    let mut jar = jar.add(cookie(TOKEN_KEY, token));
    if let Some(company) = session::normalize_company(&form.empresa_id) {
        jar = jar.add(cookie(EMPRESA_KEY, &company));
        let alias = form.empresa_alias.trim();
        jar = if alias.is_empty() {
            forget(jar, ALIAS_KEY)
        } else {
            jar.add(cookie(ALIAS_KEY, alias))
        };
    }
    Ok((jar, Redirect::to("/dashboard")).into_response())
}

async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(token) = cookie_value(&jar, TOKEN_KEY) {
        state.forget_token(&token);
    }
    info!("Session closed");
    (forget(jar, TOKEN_KEY), Redirect::to(&with_notice("/login", "Session closed")))
}

async fn company_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    if cookie_value(&jar, TOKEN_KEY).is_none() {
        return Ok(Redirect::to("/login").into_response());
    }
    let page = state.render(
        "company",
        &json!({
            "notice": query.notice,
            "empresa_id": cookie_value(&jar, EMPRESA_KEY),
            "empresa_alias": cookie_value(&jar, ALIAS_KEY),
        }),
    )?;
    Ok(page.into_response())
}

async fn handle_company(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CompanyForm>,
) -> Result<Response, AppError> {
    let Some(company) = session::normalize_company(&form.empresa_id) else {
        let page = state.render(
            "company",
            &json!({
                "notice": SessionError::MissingCompany.to_string(),
                "empresa_alias": form.empresa_alias,
            }),
        )?;
        return Ok((StatusCode::BAD_REQUEST, page).into_response());
    };

    info!("Switching company to {}", company);
    let jar = jar.add(cookie(EMPRESA_KEY, &company));
    let alias = form.empresa_alias.trim();
    let jar = if alias.is_empty() {
        forget(jar, ALIAS_KEY)
    } else {
        jar.add(cookie(ALIAS_KEY, alias))
    };
    Ok((jar, Redirect::to("/dashboard?refresh=1")).into_response())
}

async fn dashboard_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, AppError> {
    let session = match require_session(
        &jar,
        query.empresa_id.as_deref(),
        query.empresa_alias.as_deref(),
    ) {
        Ok(session) => session,
        Err(redirect) => return Ok(redirect),
    };
    let jar = remember(jar, &session);

    let shared = state.dashboard(&session);
    let mut dashboard = shared.lock().await;
    dashboard.set_alias(session.alias.as_deref());

    let mut notice = query.notice.clone();
    if !dashboard.is_loaded() || query.refresh.is_some() {
        match dashboard.reload().await {
            Ok(()) if query.refresh.is_some() && notice.is_none() => {
                notice = Some(String::from("Data updated"));
            }
            Ok(()) => {}
            Err(e) if e.is_session_expired() => {
                return Ok(session_expired(&state, jar, &session, &e.to_string()));
            }
            Err(e) => {
                state.discard_unloaded(&session, &dashboard);
                notice = Some(e.to_string());
            }
        }
    }

    if query.view.is_some() {
        dashboard.set_view(&query.q, &query.vendedor, &query.interes);
    }
    if let Some(page) = query.page {
        dashboard.go_to_page(page);
    }

    let data = dashboard_data(&state, &dashboard, notice);
    Ok((jar, state.render("dashboard", &data)?).into_response())
}

fn dashboard_data(
    state: &AppState,
    dashboard: &Dashboard<HttpGateway>,
    notice: Option<String>,
) -> serde_json::Value {
    let session = dashboard.session();
    let view = dashboard.view_state();
    let roles = dashboard.roles();
    let headers = dashboard.visible_headers();
    let page = dashboard.page();

    let rows: Vec<_> = page
        .rows
        .iter()
        .map(|row| {
            let id = dashboard.row_id(row);
            json!({
                "id": id,
                "detail_link": lead_path(&id, ""),
                "edit_link": lead_path(&id, "/edit"),
                "delete_link": lead_path(&id, "/delete"),
                "cells": headers.iter().map(|h| row.display(h)).collect::<Vec<_>>(),
            })
        })
        .collect();

    let options = |values: &[String], selected: &str| {
        values
            .iter()
            .map(|v| json!({ "value": v, "selected": v == selected }))
            .collect::<Vec<_>>()
    };

    let filters = format!(
        "q={}&vendedor={}&interes={}&view=1",
        urlencoding::encode(&view.search),
        urlencoding::encode(&view.salesperson),
        urlencoding::encode(&view.interest)
    );
    let window = page.window;
    let page_link = |n: usize| format!("/dashboard?{}&page={}", filters, n);

    json!({
        "notice": notice,
        "company": session.display_name(),
        "empresa_id": session.company,
        "who": dashboard.identity().map(|i| i.banner()),
        "kpis": dashboard.kpis(),
        "headers": headers,
        "has_id": roles.id.is_some(),
        "rows": rows,
        "empty": page.rows.is_empty(),
        "search": view.search,
        "has_salesperson": roles.salesperson.is_some(),
        "has_interest": roles.interest.is_some(),
        "salesperson_options": options(dashboard.salesperson_options(), &view.salesperson),
        "interest_options": options(dashboard.interest_options(), &view.interest),
        "window": window,
        "prev_link": window.has_prev().then(|| page_link(window.number - 1)),
        "next_link": window.has_next().then(|| page_link(window.number + 1)),
        "share_link": dashboard.share_link(&state.config.public_url),
    })
}

async fn lead_detail(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return Ok(response),
    };
    let dashboard = shared.lock().await;
    match dashboard.detail(&id) {
        Ok(fields) => {
            let page = state.render(
                "detail",
                &json!({
                    "id": id,
                    "company": session.display_name(),
                    "fields": fields,
                    "edit_link": lead_path(&id, "/edit"),
                    "delete_link": lead_path(&id, "/delete"),
                }),
            )?;
            Ok(page.into_response())
        }
        Err(e) => Ok(failure(&state, jar, &session, e, "/dashboard")),
    }
}

async fn edit_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return Ok(response),
    };
    let dashboard = shared.lock().await;
    let fields = match dashboard.edit_form(&id) {
        Ok(fields) => fields,
        Err(e) => return Ok(failure(&state, jar, &session, e, "/dashboard")),
    };
    Ok(render_edit(&state, &session, &id, &fields, query.notice)?.into_response())
}

fn render_edit(
    state: &AppState,
    session: &ActiveSession,
    id: &str,
    fields: &[EditField],
    notice: Option<String>,
) -> Result<Html<String>, AppError> {
    let fields: Vec<_> = fields
        .iter()
        .map(|f| {
            json!({
                "header": f.header,
                "value": f.value,
                "multiline": f.kind == FieldKind::MultiLine,
            })
        })
        .collect();

    state.render(
        "edit",
        &json!({
            "id": id,
            "notice": notice,
            "company": session.display_name(),
            "fields": fields,
            "action": lead_path(id, "/edit"),
        }),
    )
}

/// Overlay what the user typed on the stored form so a failed save can be retried
fn typed_fields(mut fields: Vec<EditField>, edits: &[(String, String)]) -> Vec<EditField> {
    for field in &mut fields {
        if let Some((_, value)) = edits.iter().rev().find(|(header, _)| *header == field.header) {
            field.value = value.clone();
        }
    }
    fields
}

async fn handle_edit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
    Form(edits): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return Ok(response),
    };
    let mut dashboard = shared.lock().await;
    match dashboard.save_edit(&id, edits.clone()).await {
        Ok(outcome) => match outcome.reload {
            Ok(()) => Ok((jar, Redirect::to(&with_notice("/dashboard", "Saved"))).into_response()),
            Err(e) if e.is_session_expired() => {
                Ok(session_expired(&state, jar, &session, &e.to_string()))
            }
            Err(e) => {
                let message = format!("Saved. {}", e);
                Ok((jar, Redirect::to(&with_notice("/dashboard", &message))).into_response())
            }
        },
        Err(e) if e.is_session_expired() => Ok(failure(&state, jar, &session, e, "/dashboard")),
        Err(e) => {
            warn!("Save of lead {} failed: {}", id, e);
            let fields = match dashboard.edit_form(&id) {
                Ok(fields) => typed_fields(fields, &edits),
                Err(e) => return Ok(failure(&state, jar, &session, e, "/dashboard")),
            };
            let page = render_edit(&state, &session, &id, &fields, Some(e.to_string()))?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, jar, page).into_response())
        }
    }
}

async fn delete_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return Ok(response),
    };
    let dashboard = shared.lock().await;
    match dashboard.prepare_delete(&id) {
        Ok(request) => {
            let page = state.render(
                "delete",
                &json!({
                    "id": request.id(),
                    "company": session.display_name(),
                    "action": lead_path(request.id(), "/delete"),
                }),
            )?;
            Ok(page.into_response())
        }
        Err(e) => Ok(failure(&state, jar, &session, e, "/dashboard")),
    }
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return Ok(response),
    };
    let mut dashboard = shared.lock().await;
    let request = match dashboard.prepare_delete(&id) {
        Ok(request) => request,
        Err(e) => return Ok(failure(&state, jar, &session, e, "/dashboard")),
    };
    match dashboard.delete(request).await {
        Ok(outcome) => match outcome.reload {
            Ok(()) => {
                Ok((jar, Redirect::to(&with_notice("/dashboard", "Deleted"))).into_response())
            }
            Err(e) if e.is_session_expired() => {
                Ok(session_expired(&state, jar, &session, &e.to_string()))
            }
            Err(e) => {
                let message = format!("Deleted. {}", e);
                Ok((jar, Redirect::to(&with_notice("/dashboard", &message))).into_response())
            }
        },
        Err(e) => Ok(failure(&state, jar, &session, e, "/dashboard")),
    }
}

fn download_response(download: Download) -> Response {
    info!("Sending {} ({} bytes)", download.file_name, download.content.len());
    (
        [
            (header::CONTENT_TYPE, download.mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        download.content,
    )
        .into_response()
}

async fn export_csv(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return response,
    };
    let dashboard = shared.lock().await;
    match dashboard.export_csv() {
        Ok(download) => download_response(download),
        Err(e) => failure(&state, jar, &session, e, "/dashboard"),
    }
}

async fn export_xlsx(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (session, shared) = match open(&state, &jar).await {
        Ok(opened) => opened,
        Err(response) => return response,
    };
    let dashboard = shared.lock().await;
    match dashboard.export_xlsx() {
        Ok(download) => download_response(download),
        Err(e) => failure(&state, jar, &session, e, "/dashboard"),
    }
}
