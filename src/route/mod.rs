use std::collections::BTreeMap;

use rocket::serde::json::Json;
use rocket::{Build, Rocket, Route};

pub mod appointments;
pub mod users;

use appointments::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        appointment as apt,
        availability::{AvailabilitySlotResponse, DayOfWeek},
        time::{CalendarDate, ClockTime},
        user::db::{
            CreateUserData, LoginData, PasswordUpdateData, ProfileUpdateData, RegisterData,
        },
        user::UserResponse,
    },
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        register,
        login_submit,
        user_create,
        profile_get,
        profile_update,
        password_update,
        teacher_list,
        user_list,
        appointment_list,
        appointment_create,
        appointment_update,
        appointment_delete,
        teacher_availability
    ),
    components(schemas(
        Role,
        CalendarDate,
        ClockTime,
        DayOfWeek,
        apt::AppointmentStatus,
        apt::AppointmentResponse,
        apt::CreateAppointmentData,
        apt::UpdateAppointmentData,
        apt::db::TeacherScheduleResponse,
        AvailabilitySlotResponse,
        UserResponse,
        AuthResponse,
        RegisterData,
        LoginData,
        CreateUserData,
        ProfileUpdateData,
        PasswordUpdateData,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

#[utoipa::path(
    responses(
        (status = 200, description = "Server is up"),
    )
)]
#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK", "message": "Server is running" }))
}

pub fn api_v1() -> Vec<Route> {
    routes![
        health,
        register,
        login_submit,
        user_create,
        profile_get,
        profile_update,
        password_update,
        teacher_list,
        user_list,
        appointment_list,
        appointment_create,
        appointment_update,
        appointment_delete,
        teacher_availability
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api/v1", api_v1()).mount(
        "/",
        SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
    )
}
