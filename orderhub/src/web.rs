//! Web UI Handlers
//!
//! - `GET /` - Orders registered this year, `?start=` selects the page
//! - `GET /search` - Orders matching the search form, paginated the same way
//! - `GET /stats` - Orders per month, `?year=` defaults to the current year
//! - `GET /orders/{id}` - Order detail
//! - `POST /orders`, `POST /orders/{id}`, `POST /orders/{id}/delete` - JSON order management
//! - `GET /lookups`, `POST /lookups/{kind}`, `GET /lookups/{kind}/suggest` - Reference tables
//! - `POST /lookups/{kind}/{id}`, `POST /lookups/{kind}/{id}/delete` - Rename or drop an entry
//! - `GET /users`, `POST /users`, `POST /users/{id}`, `POST /users/{id}/delete` - User administration
//!
//! Authentication happens in front of the application: the proxy puts the
//! username in the configured header and unknown users are rejected.

use askama::Template;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Datelike;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    database::{Database, DatabaseError},
    date_window::{self, DATE_FORMAT, DateWindow},
    models::{
        CreateLookupRequest, CreateOrderRequest, CreateUserRequest, LookupEntry, LookupKind, Order,
        OrderFilter, UpdateOrderRequest, User,
    },
    services::{ListingError, ListingRequest, ListingService, MonthlyCount, OrderListing},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub listing: ListingService<Database>,
    pub auth_header: String,
}

impl AppState {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            listing: ListingService::new(db.clone(), config.listing),
            db,
            auth_header: config.auth_header.clone(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum WebError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    BadRequest(String),
    Timeout(String),
    Internal(String),
}

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            WebError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebError::Forbidden => StatusCode::FORBIDDEN,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebError::Unauthorized => write!(f, "Authentication required"),
            WebError::Forbidden => write!(f, "Not allowed for this user"),
            WebError::NotFound(msg) => write!(f, "{}", msg),
            WebError::BadRequest(msg) => write!(f, "{}", msg),
            WebError::Timeout(msg) => write!(f, "{}", msg),
            WebError::Internal(_) => write!(f, "Internal server error"),
        }
    }
}

impl From<DatabaseError> for WebError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => WebError::NotFound(msg),
            DatabaseError::InvalidData(msg) => WebError::BadRequest(msg),
            DatabaseError::Query(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                WebError::BadRequest(format!("Already exists: {}", e.message()))
            }
            err => {
                tracing::error!(error = %err, "Database failure");
                WebError::Internal(err.to_string())
            }
        }
    }
}

impl From<ListingError> for WebError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Store(err) => err.into(),
            err @ ListingError::DeadlineExceeded(_) => {
                tracing::error!(error = %err, "Listing timed out");
                WebError::Timeout(err.to_string())
            }
            err @ ListingError::InvalidYear(_) => WebError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let page = ErrorTemplate {
            status: status.as_u16(),
            message: self.to_string(),
        };
        (status, HtmlTemplate(page)).into_response()
    }
}

type WebResult<T> = std::result::Result<T, WebError>;

// ============================================================================
// Viewer
// ============================================================================

/// The authenticated user behind a request.
pub struct Viewer(pub User);

impl Viewer {
    fn require_admin(&self) -> WebResult<()> {
        if self.0.is_admin { Ok(()) } else { Err(WebError::Forbidden) }
    }

    fn may_modify(&self, order: &Order) -> bool {
        self.0.is_admin || order.author == self.0.username
    }

    /// `None` for admins, who see every order.
    fn owner_scope(&self) -> Option<&str> {
        (!self.0.is_admin).then_some(self.0.username.as_str())
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> WebResult<Self> {
        let username = parts
            .headers
            .get(state.auth_header.as_str())
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .map(str::trim)
            .filter(|username| !username.is_empty())
            .ok_or(WebError::Unauthorized)?;

        match state.db.get_user_by_username(username).await {
            Ok(user) => Ok(Viewer(User::from(user))),
            Err(DatabaseError::NotFound(_)) => {
                tracing::warn!(username, "Request from unknown user");
                Err(WebError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

// Template rendering helper
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                tracing::error!("Template error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Template error: {}", err),
                )
                    .into_response()
            }
        }
    }
}

/// Values echoed back into the search form.
#[derive(Debug, Clone, Default)]
struct SearchForm {
    start_date: String,
    end_date: String,
    filter: OrderFilter,
}

impl SearchForm {
    fn for_window(window: &DateWindow) -> Self {
        Self {
            start_date: window.start.format(DATE_FORMAT).to_string(),
            end_date: window.end.format(DATE_FORMAT).to_string(),
            filter: OrderFilter::default(),
        }
    }
}

#[derive(Template)]
#[template(path = "orders.html")]
struct OrdersTemplate {
    viewer: User,
    listing: OrderListing,
    form: SearchForm,
    is_search: bool,
    doc_types: Vec<LookupEntry>,
    kinds_of_doc: Vec<LookupEntry>,
    doc_labels: Vec<LookupEntry>,
}

#[derive(Template)]
#[template(path = "order.html")]
struct OrderTemplate {
    viewer: User,
    order: Order,
    can_modify: bool,
}

#[derive(Template)]
#[template(path = "stats.html")]
struct StatsTemplate {
    viewer: User,
    year: i32,
    months: Vec<MonthlyCount>,
    total: i64,
}

struct LookupTable {
    kind: LookupKind,
    entries: Vec<LookupEntry>,
}

#[derive(Template)]
#[template(path = "lookups.html")]
struct LookupsTemplate {
    viewer: User,
    tables: Vec<LookupTable>,
}

#[derive(Template)]
#[template(path = "users.html")]
struct UsersTemplate {
    viewer: User,
    users: Vec<User>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    status: u16,
    message: String,
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    start: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    start: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    doc_type: String,
    kind_of_doc: String,
    doc_label: String,
    reg_number: String,
    description: String,
    author: String,
}

impl SearchQuery {
    fn filter(&self) -> OrderFilter {
        OrderFilter {
            doc_type: self.doc_type.clone(),
            kind_of_doc: self.kind_of_doc.clone(),
            doc_label: self.doc_label.clone(),
            reg_number: self.reg_number.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
        }
    }
}

async fn render_listing(
    state: &AppState,
    viewer: Viewer,
    request: ListingRequest,
    form: SearchForm,
) -> WebResult<Response> {
    let listing = state.listing.list_orders(&request).await?;

    let doc_types = lookup_entries(&state.db, LookupKind::DocType).await?;
    let kinds_of_doc = lookup_entries(&state.db, LookupKind::KindOfDoc).await?;
    let doc_labels = lookup_entries(&state.db, LookupKind::DocLabel).await?;

    Ok(HtmlTemplate(OrdersTemplate {
        viewer: viewer.0,
        listing,
        form,
        is_search: request.filter.is_some(),
        doc_types,
        kinds_of_doc,
        doc_labels,
    })
    .into_response())
}

/// Orders registered during the current year, newest first.
async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ListQuery>,
) -> WebResult<Response> {
    let window = date_window::current_year_window(date_window::today());
    let request = ListingRequest {
        window,
        start: query.start.unwrap_or(0),
        viewer: viewer.0.username.clone(),
        is_admin: viewer.0.is_admin,
        filter: None,
    };

    render_listing(&state, viewer, request, SearchForm::for_window(&window)).await
}

async fn search(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<SearchQuery>,
) -> WebResult<Response> {
    let window = date_window::resolve_window(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        date_window::today(),
    );
    let filter = query.filter();
    let request = ListingRequest {
        window,
        start: query.start.unwrap_or(0),
        viewer: viewer.0.username.clone(),
        is_admin: viewer.0.is_admin,
        filter: Some(filter.clone()),
    };
    let form = SearchForm {
        filter,
        ..SearchForm::for_window(&window)
    };

    render_listing(&state, viewer, request, form).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsQuery {
    year: Option<i32>,
}

/// Orders registered in each month of a year.
async fn stats(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<StatsQuery>,
) -> WebResult<Response> {
    let year = query.year.unwrap_or_else(|| date_window::today().year());
    let months = state
        .listing
        .monthly_counts(year, viewer.owner_scope())
        .await?;
    let total = months.iter().map(|m| m.count).sum();

    Ok(HtmlTemplate(StatsTemplate {
        viewer: viewer.0,
        year,
        months,
        total,
    })
    .into_response())
}

// ============================================================================
// Orders
// ============================================================================

async fn order(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> WebResult<Response> {
    let order = Order::from(state.db.get_order(id).await?);
    let can_modify = viewer.may_modify(&order);

    Ok(HtmlTemplate(OrderTemplate {
        viewer: viewer.0,
        order,
        can_modify,
    })
    .into_response())
}

/// Create an order. Only admins may file it under another author.
async fn create_order(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(req): Json<CreateOrderRequest>,
) -> WebResult<Response> {
    let author = match req.author.as_deref() {
        Some(author) if author != viewer.0.username => {
            viewer.require_admin()?;
            author.to_string()
        }
        _ => viewer.0.username.clone(),
    };

    let id = state.db.create_order(&req, &author).await?;
    tracing::info!(
        order_id = id,
        author = author.as_str(),
        reg_number = req.reg_number.as_str(),
        "Order created"
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response())
}

async fn update_order(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(req): Json<UpdateOrderRequest>,
) -> WebResult<Response> {
    let existing = Order::from(state.db.get_order(id).await?);
    if !viewer.may_modify(&existing) || (req.author != viewer.0.username && !viewer.0.is_admin) {
        return Err(WebError::Forbidden);
    }

    state.db.update_order(id, &req).await?;
    tracing::info!(order_id = id, editor = viewer.0.username.as_str(), "Order updated");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

async fn delete_order(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> WebResult<Response> {
    let existing = Order::from(state.db.get_order(id).await?);
    if !viewer.may_modify(&existing) {
        return Err(WebError::Forbidden);
    }

    state.db.delete_order(id).await?;
    tracing::info!(order_id = id, editor = viewer.0.username.as_str(), "Order deleted");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

// ============================================================================
// Lookups
// ============================================================================

async fn lookup_entries(db: &Database, kind: LookupKind) -> WebResult<Vec<LookupEntry>> {
    Ok(db
        .list_lookup(kind)
        .await?
        .into_iter()
        .map(LookupEntry::from)
        .collect())
}

fn parse_kind(kind: &str) -> WebResult<LookupKind> {
    kind.parse().map_err(WebError::NotFound)
}

async fn lookups(State(state): State<AppState>, viewer: Viewer) -> WebResult<Response> {
    let mut tables = Vec::with_capacity(LookupKind::ALL.len());
    for kind in LookupKind::ALL {
        tables.push(LookupTable {
            kind,
            entries: lookup_entries(&state.db, kind).await?,
        });
    }

    Ok(HtmlTemplate(LookupsTemplate {
        viewer: viewer.0,
        tables,
    })
    .into_response())
}

async fn create_lookup(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(kind): Path<String>,
    Json(req): Json<CreateLookupRequest>,
) -> WebResult<Response> {
    viewer.require_admin()?;
    let kind = parse_kind(&kind)?;

    let id = state.db.create_lookup(kind, &req.name).await?;
    tracing::info!(lookup = %kind, id, name = req.name.as_str(), "Lookup entry created");

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response())
}

async fn rename_lookup(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<CreateLookupRequest>,
) -> WebResult<Response> {
    viewer.require_admin()?;
    let kind = parse_kind(&kind)?;

    state.db.rename_lookup(kind, id, &req.name).await?;
    tracing::info!(lookup = %kind, id, name = req.name.as_str(), "Lookup entry renamed");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

/// Entries still referenced by an order or a user cannot be deleted.
async fn delete_lookup(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((kind, id)): Path<(String, i64)>,
) -> WebResult<Response> {
    viewer.require_admin()?;
    let kind = parse_kind(&kind)?;

    state.db.delete_lookup(kind, id).await?;
    tracing::info!(lookup = %kind, id, "Lookup entry deleted");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SuggestQuery {
    q: String,
}

/// Autocomplete for the order form.
async fn suggest_lookup(
    State(state): State<AppState>,
    _viewer: Viewer,
    Path(kind): Path<String>,
    Query(query): Query<SuggestQuery>,
) -> WebResult<Json<Vec<LookupEntry>>> {
    let kind = parse_kind(&kind)?;
    let rows = state.db.suggest_lookup(kind, &query.q).await?;
    Ok(Json(rows.into_iter().map(LookupEntry::from).collect()))
}

// ============================================================================
// Users
// ============================================================================

async fn users(State(state): State<AppState>, viewer: Viewer) -> WebResult<Response> {
    viewer.require_admin()?;
    let users = state
        .db
        .list_users()
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(HtmlTemplate(UsersTemplate {
        viewer: viewer.0,
        users,
    })
    .into_response())
}

async fn create_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(req): Json<CreateUserRequest>,
) -> WebResult<Response> {
    viewer.require_admin()?;
    if req.username.trim().is_empty() {
        return Err(WebError::BadRequest("Username is required".to_string()));
    }

    let id = state.db.create_user(&req).await?;
    tracing::info!(user_id = id, username = req.username.as_str(), "User created");

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response())
}

/// Replaces email, admin flag and department. The username is kept.
async fn update_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(req): Json<CreateUserRequest>,
) -> WebResult<Response> {
    viewer.require_admin()?;

    state.db.update_user(id, &req).await?;
    tracing::info!(user_id = id, admin = req.is_admin, "User updated");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

async fn delete_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> WebResult<Response> {
    viewer.require_admin()?;
    if id == viewer.0.id {
        return Err(WebError::BadRequest("Cannot delete your own account".to_string()));
    }

    state.db.delete_user(id).await?;
    tracing::info!(user_id = id, "User deleted");

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/stats", get(stats))
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(order).post(update_order))
        .route("/orders/{id}/delete", post(delete_order))
        .route("/lookups", get(lookups))
        .route("/lookups/{kind}", post(create_lookup))
        .route("/lookups/{kind}/suggest", get(suggest_lookup))
        .route("/lookups/{kind}/{id}", post(rename_lookup))
        .route("/lookups/{kind}/{id}/delete", post(delete_lookup))
        .route("/users", get(users).post(create_user))
        .route("/users/{id}", post(update_user))
        .route("/users/{id}/delete", post(delete_user))
        .route("/health", get(|| async { "OK" }))
}

/// The application with request tracing, ready to be served.
pub fn app(state: AppState) -> Router {
    routes().layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_error_status_codes() {
        let not_found: WebError = DatabaseError::NotFound("Order with id 3 not found".into()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid: WebError = DatabaseError::InvalidData("Unknown doc-type 'x'".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let timeout: WebError = ListingError::DeadlineExceeded(Duration::from_millis(5)).into();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let nested: WebError = ListingError::Store(DatabaseError::NotFound("x".into())).into();
        assert_eq!(nested.status(), StatusCode::NOT_FOUND);

        let year: WebError = ListingError::InvalidYear(300_000).into();
        assert_eq!(year.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_viewer_scope() {
        let mut user = User {
            id: 2,
            username: "ivanova".to_string(),
            email: "ivanova@example.org".to_string(),
            is_admin: false,
            department: None,
            created_at: String::new(),
        };
        let order = Order {
            id: 1,
            doc_type: "приказ".to_string(),
            kind_of_doc: "По личному составу".to_string(),
            doc_label: "ДСП".to_string(),
            reg_date: chrono::NaiveDate::from_ymd_opt(2023, 1, 9).unwrap(),
            reg_number: "4".to_string(),
            description: String::new(),
            author: "petrov".to_string(),
            file_original: String::new(),
            file_copy: String::new(),
            current: true,
        };

        let viewer = Viewer(user.clone());
        assert_eq!(viewer.owner_scope(), Some("ivanova"));
        assert!(!viewer.may_modify(&order));
        assert!(viewer.require_admin().is_err());

        user.is_admin = true;
        let admin = Viewer(user);
        assert_eq!(admin.owner_scope(), None);
        assert!(admin.may_modify(&order));
    }
}
