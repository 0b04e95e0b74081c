use crate::backend::SchedulerBackend;
use crate::configuration::Configuration;
use crate::error::SchedulerError;
use crate::scheduler::{CreateBookingRequest, Scheduler, WindowRequest};
use crate::types::{Caller, PaymentStatus};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, Request};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use uuid::Uuid;

const USER_HEADER: &str = "x-user-id";
const ADMIN_HEADER: &str = "x-admin-password";

#[derive(Clone)]
pub struct AppState<B: SchedulerBackend, C: Configuration> {
    pub scheduler: Scheduler<B>,
    pub configuration: C,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    message: String,
    data: T,
}

fn respond<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (
        status,
        Json(ApiResponse {
            success: true,
            message: message.into(),
            data,
        }),
    )
        .into_response()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AvailabilityQuery {
    date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PaymentUpdateRequest {
    payment_status: PaymentStatus,
}

pub fn create_app<B: SchedulerBackend, C: Configuration>(
    scheduler: Scheduler<B>,
    configuration: C,
) -> Router {
    let state = AppState {
        scheduler,
        configuration,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/hosts/:host_id/availability", get(get_availability::<B, C>))
        .route("/hosts/:host_id/windows", get(get_windows::<B, C>))
        .route(
            "/bookings",
            post(create_booking::<B, C>).get(get_own_bookings::<B, C>),
        )
        .route(
            "/bookings/:id",
            get(get_booking::<B, C>).delete(cancel_booking::<B, C>),
        )
        .route("/reminders/sweep", get(reminder_sweep::<B, C>));

    let admin = Router::new()
        .route("/admin/hosts/:host_id/windows", post(add_window::<B, C>))
        .route("/admin/windows/:id", delete(remove_window::<B, C>))
        .route("/admin/bookings", get(list_bookings::<B, C>))
        .route("/admin/bookings/stream", get(booking_event_stream::<B, C>))
        .route("/admin/bookings/:id/payment", put(update_payment::<B, C>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth::<B, C>,
        ));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn is_admin<C: Configuration>(headers: &HeaderMap, configuration: &C) -> bool {
    headers
        .get(ADMIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|password| password == configuration.admin_password())
}

fn user_id(headers: &HeaderMap) -> Result<Uuid, SchedulerError> {
    let value = headers
        .get(USER_HEADER)
        .ok_or_else(|| SchedulerError::unauthorized("Missing credentials"))?;
    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| SchedulerError::unauthorized("Malformed user identity"))
}

fn caller<C: Configuration>(headers: &HeaderMap, configuration: &C) -> Result<Caller, SchedulerError> {
    if is_admin(headers, configuration) {
        return Ok(Caller::Admin);
    }
    user_id(headers).map(Caller::User)
}

fn rejected(body_text: String) -> SchedulerError {
    SchedulerError::validation(body_text)
}

async fn admin_auth<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    request: Request,
    next: Next,
) -> Result<Response, SchedulerError> {
    match request.headers().get(ADMIN_HEADER) {
        None => return Err(SchedulerError::unauthorized("Missing credentials")),
        Some(_) if !is_admin(request.headers(), &state.configuration) => {
            return Err(SchedulerError::unauthorized("Wrong admin password"))
        }
        Some(_) => {}
    }
    Ok(next.run(request).await)
}

async fn get_availability<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    host_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Response, SchedulerError> {
    let Path(host_id) = host_id.map_err(|rejection| rejected(rejection.body_text()))?;
    let Query(query) = query.map_err(|rejection| rejected(rejection.body_text()))?;

    let slots = state.scheduler.available_slots(host_id, query.date)?;
    debug!(%host_id, date = %query.date, slots = slots.len(), "Availability computed");
    Ok(respond(StatusCode::OK, "Available slots", slots))
}

async fn get_windows<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    host_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, SchedulerError> {
    let Path(host_id) = host_id.map_err(|rejection| rejected(rejection.body_text()))?;
    let windows = state.scheduler.host_windows(host_id)?;
    Ok(respond(StatusCode::OK, "Availability windows", windows))
}

async fn create_booking<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    headers: HeaderMap,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<Response, SchedulerError> {
    let user_id = user_id(&headers)?;
    let Json(request) = payload.map_err(|rejection| rejected(rejection.body_text()))?;

    let booking = state.scheduler.create_booking(user_id, request)?;
    Ok(respond(StatusCode::CREATED, "Timeslot booked successfully", booking))
}

async fn get_own_bookings<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    headers: HeaderMap,
) -> Result<Response, SchedulerError> {
    let user_id = user_id(&headers)?;
    let bookings = state.scheduler.user_bookings(user_id)?;
    Ok(respond(StatusCode::OK, "Your bookings", bookings))
}

async fn get_booking<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, SchedulerError> {
    let caller = caller(&headers, &state.configuration)?;
    let Path(id) = id.map_err(|rejection| rejected(rejection.body_text()))?;

    let booking = state.scheduler.booking(caller, id)?;
    Ok(respond(StatusCode::OK, "Booking", booking))
}

async fn cancel_booking<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, SchedulerError> {
    let caller = caller(&headers, &state.configuration)?;
    let Path(id) = id.map_err(|rejection| rejected(rejection.body_text()))?;

    let booking = state.scheduler.cancel_booking(caller, id)?;
    Ok(respond(StatusCode::OK, "Booking cancelled", booking))
}

async fn reminder_sweep<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    headers: HeaderMap,
) -> Result<Response, SchedulerError> {
    let Some(secret) = state.configuration.cron_secret() else {
        return Err(SchedulerError::unauthorized("Reminder sweep is disabled"));
    };
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret);
    if !authorized {
        return Err(SchedulerError::unauthorized("Invalid sweep token"));
    }

    let report = state.scheduler.reminder_sweep()?;
    Ok(respond(StatusCode::OK, "Reminder sweep finished", report))
}

async fn add_window<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    host_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<WindowRequest>, JsonRejection>,
) -> Result<Response, SchedulerError> {
    let Path(host_id) = host_id.map_err(|rejection| rejected(rejection.body_text()))?;
    let Json(request) = payload.map_err(|rejection| rejected(rejection.body_text()))?;

    let window = state.scheduler.add_window(host_id, request)?;
    Ok(respond(StatusCode::CREATED, "Availability window added", window))
}

async fn remove_window<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, SchedulerError> {
    let Path(id) = id.map_err(|rejection| rejected(rejection.body_text()))?;
    state.scheduler.remove_window(id)?;
    Ok(respond(StatusCode::OK, "Availability window removed", ()))
}

async fn list_bookings<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response, SchedulerError> {
    let Query(query) = query.map_err(|rejection| rejected(rejection.body_text()))?;
    let page = state.scheduler.bookings_page(query.page, query.per_page)?;
    Ok(respond(StatusCode::OK, "Bookings", page))
}

async fn update_payment<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PaymentUpdateRequest>, JsonRejection>,
) -> Result<Response, SchedulerError> {
    let Path(id) = id.map_err(|rejection| rejected(rejection.body_text()))?;
    let Json(request) = payload.map_err(|rejection| rejected(rejection.body_text()))?;

    let booking = state
        .scheduler
        .set_payment_status(id, request.payment_status)?;
    Ok(respond(StatusCode::OK, "Payment status updated", booking))
}

async fn booking_event_stream<B: SchedulerBackend, C: Configuration>(
    State(state): State<AppState<B, C>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .scheduler
        .booking_events()
        .filter_map(|event| async move {
            let event = event?;
            match Event::default().event(event.kind.as_str()).json_data(&event) {
                Ok(sse_event) => Some(Ok(sse_event)),
                Err(err) => {
                    error!(?err, "Failed to serialize booking event");
                    None
                }
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
