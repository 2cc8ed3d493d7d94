#![cfg(not(tarpaulin_include))]

use clap::Parser;
use nexcard_panel::config::Config;
use nexcard_panel::dashboard::{Dashboard, DashboardError};
use nexcard_panel::editor::FieldKind;
use nexcard_panel::gateway::HttpGateway;
use nexcard_panel::session::{self, SessionError, SessionFile, StoredSession};
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Browse and manage Nexcard leads from the terminal
#[derive(Parser, Debug)]
#[command(name = "nexcard-panel", version)]
struct Args {
    /// Company to open (overrides the remembered one)
    #[arg(long)]
    empresa_id: Option<String>,

    /// Display name for the company
    #[arg(long)]
    empresa_alias: Option<String>,

    /// Session token to store before starting
    #[arg(long)]
    token: Option<String>,

    /// Script endpoint (overrides NEXCARD_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Rows per page (overrides NEXCARD_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<usize>,

    /// Session file location (overrides NEXCARD_SESSION_FILE)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Request JSONP-wrapped replies
    #[arg(long)]
    jsonp: bool,
}

enum Exit {
    Quit,
    Logout,
    SessionExpired,
}

const COLUMN_WIDTH: usize = 22;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(api_base) = args.api_base.clone() {
        config.api_base = api_base;
    }
    if let Some(page_size) = args.page_size.filter(|p| *p > 0) {
        config.page_size = page_size;
    }
    if let Some(path) = args.session_file.clone() {
        config.session_file = path;
    }
    config.jsonp |= args.jsonp;

    let gateway =
        HttpGateway::with_timeout(config.api_base.clone(), config.timeout)?.jsonp(config.jsonp);
    let file = SessionFile::new(config.session_file.clone());
    let mut stored = file.load()?;
    if let Some(token) = args.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        stored.token = Some(token.to_string());
        file.save(&stored)?;
    }

    let mut requested_company = args.empresa_id.clone();
    loop {
        match session::resolve(
            requested_company.as_deref(),
            args.empresa_alias.as_deref(),
            &stored,
        ) {
            Err(SessionError::MissingToken) => {
                println!("Log in with the session token issued by the Nexcard backend.");
                let Some(token) = prompt("Token (empty to quit): ")?.filter(|t| !t.is_empty())
                else {
                    return Ok(());
                };
                stored.token = Some(token);
                file.save(&stored)?;
            }
            Err(SessionError::MissingCompany) => {
                println!("Pick a company (e.g. trampaclean).");
                let Some(raw) = prompt("empresa_id (empty to quit): ")?.filter(|c| !c.is_empty())
                else {
                    return Ok(());
                };
                requested_company = session::normalize_company(&raw);
            }
            Err(e) => return Err(e.into()),
            Ok(active) => {
                stored.remember(&active);
                file.save(&stored)?;
                let mut dashboard = Dashboard::new(gateway.clone(), active, config.page_size);
                match run_dashboard(&mut dashboard, &config, &file, &mut stored).await? {
                    Exit::Quit => return Ok(()),
                    Exit::Logout => {
                        println!("Session closed");
                        stored.clear_token();
                        file.save(&stored)?;
                    }
                    Exit::SessionExpired => {
                        stored.clear_token();
                        file.save(&stored)?;
                    }
                }
                requested_company = None;
            }
        }
    }
}

/// Print `label` and read one line; `None` on end of input
fn prompt(label: &str) -> CliResult<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    read_line()
}

fn read_line() -> CliResult<Option<String>> {
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn confirm(label: &str) -> CliResult<bool> {
    Ok(prompt(label)?
        .map(|a| a.trim().eq_ignore_ascii_case("y"))
        .unwrap_or(false))
}

async fn run_dashboard(
    dashboard: &mut Dashboard<HttpGateway>,
    config: &Config,
    file: &SessionFile,
    stored: &mut StoredSession,
) -> CliResult<Exit> {
    println!("Loading data…");
    let mut status = String::from("ok");
    if let Err(e) = dashboard.reload().await {
        println!("{}", e);
        if e.is_session_expired() {
            return Ok(Exit::SessionExpired);
        }
        status = e.to_string();
    }

    let mut show = true;
    loop {
        if show {
            render(dashboard);
        }
        show = true;

        let window = dashboard.page_window();
        let Some(line) = prompt(&format!(
            "[{}/{}] ({}) > ",
            window.number, window.total_pages, status
        ))?
        else {
            return Ok(Exit::Quit);
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        status = String::from("ok");

        match command {
            "" => show = false,
            "help" => {
                print_help();
                show = false;
            }
            "q" => return Ok(Exit::Quit),
            "logout" => return Ok(Exit::Logout),
            "refresh" => {
                println!("Loading data…");
                if let Err(e) = dashboard.reload().await {
                    if let Some(exit) = expired(&e) {
                        return Ok(exit);
                    }
                    status = e.to_string();
                } else {
                    status = String::from("updated");
                }
            }
            "search" => dashboard.set_search(rest),
            "vendedor" => dashboard.set_salesperson_filter(if rest == "-" { "" } else { rest }),
            "interes" => dashboard.set_interest_filter(if rest == "-" { "" } else { rest }),
            "clear" => dashboard.clear_filters(),
            "n" => dashboard.next_page(),
            "p" => dashboard.prev_page(),
            "page" => match rest.parse::<usize>() {
                Ok(n) => dashboard.go_to_page(n),
                Err(_) => status = String::from("invalid page"),
            },
            "options" => {
                println!("Vendedor: {}", dashboard.salesperson_options().join(" | "));
                println!("Interés/Servicio: {}", dashboard.interest_options().join(" | "));
                show = false;
            }
            "kpi" => {
                print_kpis(dashboard);
                show = false;
            }
            "view" => {
                match dashboard.detail(rest) {
                    Ok(fields) => {
                        println!("Contact detail:");
                        for field in fields {
                            println!("{:>20}: {}", field.header, field.value);
                        }
                    }
                    Err(e) => status = e.to_string(),
                }
                show = false;
            }
            "edit" => match edit(dashboard, rest).await? {
                Ok(message) => status = message,
                Err(e) => {
                    if let Some(exit) = expired(&e) {
                        return Ok(exit);
                    }
                    status = e.to_string();
                }
            },
            "delete" => match delete(dashboard, rest).await? {
                Ok(message) => status = message,
                Err(e) => {
                    if let Some(exit) = expired(&e) {
                        return Ok(exit);
                    }
                    status = e.to_string();
                }
            },
            "export" => {
                match dashboard.export_csv() {
                    Ok(download) => {
                        let target = (!rest.is_empty()).then(|| Path::new(rest));
                        status = match download.save(target) {
                            Ok(path) => format!("CSV written to {}", path.display()),
                            Err(e) => format!("could not write CSV: {}", e),
                        };
                    }
                    Err(e) => status = e.to_string(),
                }
                show = false;
            }
            "link" => {
                println!("{}", dashboard.share_link(&config.public_url));
                show = false;
            }
            "company" => match dashboard.switch_company(rest, None) {
                Ok(()) => {
                    stored.remember(dashboard.session());
                    stored.empresa_alias = None;
                    if let Err(e) = file.save(stored) {
                        println!("could not remember the company: {}", e);
                    }
                    println!("Loading data…");
                    if let Err(e) = dashboard.reload().await {
                        if let Some(exit) = expired(&e) {
                            return Ok(exit);
                        }
                        status = e.to_string();
                    }
                }
                Err(e) => status = e.to_string(),
            },
            _ => status = String::from("invalid command"),
        }
    }
}

fn expired(e: &DashboardError) -> Option<Exit> {
    if e.is_session_expired() {
        println!("{}", e);
        Some(Exit::SessionExpired)
    } else {
        None
    }
}

async fn edit(
    dashboard: &mut Dashboard<HttpGateway>,
    id: &str,
) -> CliResult<Result<String, DashboardError>> {
    let fields = match dashboard.edit_form(id) {
        Ok(fields) => fields,
        Err(e) => return Ok(Err(e)),
    };

    println!("Editing contact {} (Enter keeps a value, a lone '-' clears it)", id);
    let mut edits = Vec::with_capacity(fields.len());
    for field in fields {
        let entered = match field.kind {
            FieldKind::SingleLine => prompt(&format!("{} [{}]: ", field.header, field.value))?,
            FieldKind::MultiLine => read_multiline(&field.header, &field.value)?,
        };
        let Some(entered) = entered else {
            return Ok(Ok(String::from("edit cancelled")));
        };
        let value = match entered.as_str() {
            "" => field.value,
            "-" => String::new(),
            _ => entered,
        };
        edits.push((field.header, value));
    }

    if !confirm("Save changes? [y/N] ")? {
        return Ok(Ok(String::from("edit cancelled")));
    }
    println!("Saving…");
    Ok(dashboard.save_edit(id, edits).await.and_then(|outcome| {
        outcome.reload?;
        Ok(String::from("Saved"))
    }))
}

/// Multi-line input ends with a line holding a single `.`
fn read_multiline(header: &str, current: &str) -> CliResult<Option<String>> {
    println!("{} (end with a line containing only '.'):", header);
    println!("  current: {}", current);
    let mut lines: Vec<String> = Vec::new();
    loop {
        let Some(line) = read_line()? else {
            return Ok(None);
        };
        if line == "." {
            break;
        }
        lines.push(line);
    }
    Ok(Some(lines.join("\n")))
}

async fn delete(
    dashboard: &mut Dashboard<HttpGateway>,
    id: &str,
) -> CliResult<Result<String, DashboardError>> {
    let request = match dashboard.prepare_delete(id) {
        Ok(request) => request,
        Err(e) => return Ok(Err(e)),
    };
    println!("Delete contact {}? This cannot be undone.", request.id());
    if !confirm("Delete? [y/N] ")? {
        return Ok(Ok(String::from("delete cancelled")));
    }
    println!("Deleting…");
    Ok(dashboard.delete(request).await.and_then(|outcome| {
        outcome.reload?;
        Ok(String::from("Deleted"))
    }))
}

fn truncate(value: &str, width: usize) -> String {
    let flat = value.replace('\n', " ");
    if flat.chars().count() <= width {
        flat
    } else {
        let mut cut: String = flat.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn render(dashboard: &Dashboard<HttpGateway>) {
    let session = dashboard.session();
    let who = dashboard
        .identity()
        .map(|i| i.banner())
        .unwrap_or_else(|| String::from("-"));
    println!();
    println!("{} • {}", session.display_name(), who);
    print_kpis(dashboard);

    let state = dashboard.view_state();
    if state.has_filters() {
        println!(
            "Search: {:?}  Vendedor: {:?}  Interés/Servicio: {:?}",
            state.search, state.salesperson, state.interest
        );
    }

    let headers = dashboard.visible_headers();
    let mut header_line = format!("{:<8}", "#");
    for h in headers {
        header_line.push_str(&format!(
            " {:<width$}",
            truncate(h, COLUMN_WIDTH),
            width = COLUMN_WIDTH
        ));
    }
    println!("{}", header_line);
    println!("{}", "-".repeat(header_line.chars().count()));

    let page = dashboard.page();
    for row in &page.rows {
        let mut line = format!("{:<8}", truncate(&dashboard.row_id(row), 8));
        for h in headers {
            line.push_str(&format!(
                " {:<width$}",
                truncate(&row.display(h), COLUMN_WIDTH),
                width = COLUMN_WIDTH
            ));
        }
        println!("{}", line);
    }

    println!(
        "Page {} / {} • {} result(s)",
        page.window.number, page.window.total_pages, page.window.total_results
    );
}

fn print_kpis(dashboard: &Dashboard<HttpGateway>) {
    let kpis = dashboard.kpis();
    println!(
        "Total: {} | Today: {} | 7 days: {} | 30 days: {}",
        kpis.total, kpis.today, kpis.last_7_days, kpis.last_30_days
    );
}

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  refresh: Reload data from the server");
    println!("  search <text>: Search visible columns (empty clears)");
    println!("  vendedor <value|->: Filter by salesperson ('-' clears)");
    println!("  interes <value|->: Filter by interest/service ('-' clears)");
    println!("  clear: Clear search and filters");
    println!("  n / p: Next / previous page");
    println!("  page <n>: Jump to page");
    println!("  options: List filter values");
    println!("  kpi: Show lead counters");
    println!("  view <id>: Show every field of a contact");
    println!("  edit <id>: Edit a contact");
    println!("  delete <id>: Delete a contact");
    println!("  export [path]: Write the filtered rows as CSV");
    println!("  link: Print the shareable dashboard link");
    println!("  company <empresa_id>: Switch company");
    println!("  logout: Forget the session token");
}
