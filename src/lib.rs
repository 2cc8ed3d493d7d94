/*!
# Nexcard Panel

A lead-management dashboard client for the Nexcard spreadsheet-backed script
service, built in Rust.

## Overview

Every company (`empresa_id`) keeps its leads in a spreadsheet exposed through a
hosted script endpoint. This crate fetches that sheet, works out which columns
hold the ID, date, salesperson and interest of each lead, and lets the user
search, filter, page through, export, edit and delete rows. It ships two front
ends over the same controller: an interactive terminal client and, behind the
`web` feature, a small server-rendered web dashboard.

## Architecture

### Remote layer
- **gateway**: typed HTTP client for the four backend actions (`me`,
  `listLeads`, `saveLead`, `deleteLead`), decoding `{ok, message, ...}` replies
  into a tagged [`gateway::Reply`]. JSONP-wrapped replies are understood too.

### Domain layer
- **row**: ordered header → value association list for one lead
- **columns**: alias-based detection of the ID / date / salesperson / interest columns
- **dates**: the date parsing rules used for sorting and recency counts
- **view**: sorting, filtering, search, filter options and pagination
- **kpi**: today / 7-day / 30-day lead counts
- **editor**: detail and edit field derivation, merging of edits
- **downloader**: CSV export (and XLSX with the `web` feature)

### Application layer
- **session**: token and company resolution, session file
- **config**: `NEXCARD_*` environment configuration
- **dashboard**: the single owner of loaded data and view state
- **app**: axum router and handlers (`web` feature)

## Design Highlights

- Pure derivation functions; only [`dashboard::Dashboard`] mutates state
- The backend sits behind the [`gateway::LeadsBackend`] trait
- Requests are ordinary futures and can be cancelled by dropping them
*/

pub mod columns;
pub mod config;
pub mod dashboard;
pub mod dates;
pub mod downloader;
pub mod editor;
pub mod gateway;
pub mod kpi;
pub mod row;
pub mod session;
pub mod view;

#[cfg(feature = "web")]
pub mod app;

pub use columns::{ColumnRoles, Role};
pub use config::Config;
pub use dashboard::{Dashboard, DashboardError, DeleteRequest, WriteOutcome};
pub use gateway::{GatewayError, HttpGateway, Identity, LeadSheet, LeadsBackend, SaveOutcome};
pub use kpi::Kpis;
pub use row::{Row, Value};
pub use session::{ActiveSession, SessionError, SessionFile, StoredSession};
pub use view::{PageWindow, ViewState};
