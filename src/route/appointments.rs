use mongodb::Database;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::State;
use std::str::FromStr;
use uuid::Uuid;

use crate::data::appointment::db::{AppointmentDbExt, TeacherScheduleResponse};
use crate::data::appointment::{AppointmentResponse, CreateAppointmentData, UpdateAppointmentData};
use crate::data::time::CalendarDate;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

/// Role-scoped appointment listing: students see their own bookings,
/// teachers the ones assigned to them, admins everything.
#[utoipa::path(
    responses(
        (status = 200, description = "Enriched appointments, newest first", body = Vec<AppointmentResponse>),
    ),
    security(("jwt" = []))
)]
#[get("/appointment")]
#[tracing::instrument(skip(db))]
pub async fn appointment_list(
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<AppointmentResponse>>, Problem> {
    db.list_appointments(&auth).await.map(Json)
}

#[utoipa::path(
    request_body = CreateAppointmentData,
    responses(
        (status = 201, description = "Created appointment", body = AppointmentResponse),
        (status = 400, description = "Missing required fields", body = Problem),
        (status = 404, description = "Teacher doesn't exist", body = Problem),
        (status = 409, description = "Slot already booked", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/appointment", format = "application/json", data = "<appointment>")]
#[tracing::instrument(skip(db))]
pub async fn appointment_create(
    appointment: Json<CreateAppointmentData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Created<Json<AppointmentResponse>>, Problem> {
    let created = db
        .create_appointment(&auth, appointment.into_inner())
        .await?;

    let location = format!("/api/v1/appointment/{}", created.id);
    Ok(Created::new(location).body(Json(created)))
}

#[utoipa::path(
    request_body = UpdateAppointmentData,
    responses(
        (status = 200, description = "Updated appointment", body = AppointmentResponse),
        (status = 400, description = "No updates provided", body = Problem),
        (status = 403, description = "Caller unrelated to the appointment", body = Problem),
        (status = 404, description = "Appointment doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/appointment/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn appointment_update(
    id: Uuid,
    update: Json<UpdateAppointmentData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<AppointmentResponse>, Problem> {
    db.update_appointment(&auth, id, update.into_inner())
        .await
        .map(Json)
}

/// Hard delete; not recoverable.
#[utoipa::path(
    responses(
        (status = 200, description = "Deleted appointment id"),
        (status = 403, description = "Caller unrelated to the appointment", body = Problem),
        (status = 404, description = "Appointment doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/appointment/<id>")]
#[tracing::instrument(skip(db))]
pub async fn appointment_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<String, Problem> {
    let removed = db.delete_appointment(&auth, id).await?;
    Ok(removed.to_string())
}

/// A teacher's weekly availability windows plus, when `date` is given,
/// that date's non-terminal bookings. Free sub-intervals are computed by
/// the caller from the two raw lists.
#[utoipa::path(
    params(
        ("teacher_id", description = "teacher account ID"),
        ("date" = Option<String>, Query, description = "calendar date (YYYY-MM-DD)"),
    ),
    responses(
        (status = 200, description = "Availability windows and same-day bookings", body = TeacherScheduleResponse),
        (status = 400, description = "Malformed date", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/appointment/teacher/<teacher_id>/availability?<date>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_availability(
    teacher_id: Uuid,
    date: Option<String>,
    _auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TeacherScheduleResponse>, Problem> {
    let date = match date {
        Some(raw) => Some(
            CalendarDate::from_str(&raw).map_err(|e| problems::invalid_input(e.to_string()))?,
        ),
        None => None,
    };

    db.teacher_schedule(teacher_id, date).await.map(Json)
}
