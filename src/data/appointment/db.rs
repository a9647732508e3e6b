use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::availability::{
    AvailabilitySlot, AvailabilitySlotResponse, AVAILABILITY_COLLECTION_NAME,
};
use crate::data::filter;
use crate::data::time::CalendarDate;
use crate::data::user::db::UserDbExt;
use crate::data::user::User;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::role::Role;

use super::{
    can_modify, conflict_filter, list_filter, Appointment, AppointmentResponse,
    CreateAppointmentData, UpdateAppointmentData, APPOINTMENT_COLLECTION_NAME,
};

pub mod problem {
    use crate::resp::problem::Problem;
    use crate::role::Role;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn teacher_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Teacher not found.")
            .insert_str("teacher_id", id)
            .clone()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Appointment not found.")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn slot_taken() -> Problem {
        Problem::new_untyped(Status::Conflict, "This time slot is already booked.")
    }

    #[inline]
    pub fn no_updates() -> Problem {
        Problem::new_untyped(Status::BadRequest, "No updates provided.")
    }

    #[inline]
    pub fn not_related(role: Role, action: &str) -> Problem {
        let detail = match role {
            Role::Teacher => format!("You can only {} appointments assigned to you.", action),
            _ => format!("You can only {} your own appointments.", action),
        };
        Problem::new_untyped(Status::Forbidden, "Not allowed.")
            .detail(detail)
            .to_owned()
    }
}

lazy_static! {
    static ref TEACHER_SLOT_LOCKS: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>> =
        Mutex::new(HashMap::new());
}

/// Per-teacher serialization point for the conflict-check-then-insert pair.
/// Without it two concurrent bookings for the same teacher could both pass
/// the conflict check before either insert lands. Only serializes within
/// this process; multi-process deployments need a storage-level primitive.
fn teacher_slot_lock(teacher_id: Uuid) -> Arc<AsyncMutex<()>> {
    let mut locks = TEACHER_SLOT_LOCKS
        .lock()
        .expect("teacher slot lock map poisoned");
    locks
        .entry(teacher_id)
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Availability windows plus (when a date was supplied) that date's
/// non-terminal appointments. Raw lists; free sub-intervals are computed
/// by the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeacherScheduleResponse {
    pub availability: Vec<AvailabilitySlotResponse>,
    pub appointments: Vec<AppointmentResponse>,
}

pub trait AppointmentDbExt {
    async fn list_appointments(
        &self,
        auth: &UserRoleToken,
    ) -> Result<Vec<AppointmentResponse>, Problem>;

    async fn create_appointment(
        &self,
        auth: &UserRoleToken,
        data: CreateAppointmentData,
    ) -> Result<AppointmentResponse, Problem>;

    async fn update_appointment(
        &self,
        auth: &UserRoleToken,
        id: Uuid,
        data: UpdateAppointmentData,
    ) -> Result<AppointmentResponse, Problem>;

    async fn delete_appointment(&self, auth: &UserRoleToken, id: Uuid) -> Result<Uuid, Problem>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, Problem>;

    async fn teacher_schedule(
        &self,
        teacher_id: Uuid,
        date: Option<CalendarDate>,
    ) -> Result<TeacherScheduleResponse, Problem>;
}

impl AppointmentDbExt for Database {
    async fn list_appointments(
        &self,
        auth: &UserRoleToken,
    ) -> Result<Vec<AppointmentResponse>, Problem> {
        // Most recent / future-facing first; lexicographic order on the
        // stored strings matches chronology.
        let options = FindOptions::builder()
            .sort(doc! { "date": -1, "start_time": -1 })
            .build();

        let mut cursor = self
            .collection::<Appointment>(APPOINTMENT_COLLECTION_NAME)
            .find(list_filter(auth), options)
            .await?;

        let mut appointments = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(apt) => appointments.push(apt),
                Err(_) => {
                    tracing::warn!("Unable to deserialize Appointment document.")
                }
            }
        }

        // A student's view names the teacher, a teacher's view names the
        // student, an admin sees both sides.
        let mut ids: Vec<Uuid> = vec![];
        for apt in &appointments {
            if auth.role != Role::Student {
                ids.push(apt.student_id);
            }
            if auth.role != Role::Teacher {
                ids.push(apt.teacher_id);
            }
        }
        let users = lookup_users(self, ids).await?;

        Ok(appointments
            .into_iter()
            .map(|apt| {
                let student = users.get(&apt.student_id).cloned();
                let teacher = users.get(&apt.teacher_id).cloned();
                let mut resp = AppointmentResponse::from(apt);
                if let Some(student) = student {
                    resp = resp.with_student(&student);
                }
                if let Some(teacher) = teacher {
                    resp = resp.with_teacher(&teacher);
                }
                resp
            })
            .collect())
    }

    async fn create_appointment(
        &self,
        auth: &UserRoleToken,
        data: CreateAppointmentData,
    ) -> Result<AppointmentResponse, Problem> {
        data.validate()?;
        let student_id = data.effective_student(auth)?;

        let teacher = self
            .get_user_with_role(data.teacher_id, Role::Teacher)
            .await?
            .ok_or_else(|| problem::teacher_not_found(data.teacher_id))?;

        let lock = teacher_slot_lock(data.teacher_id);
        let _guard = lock.lock().await;

        let requested = data.time_range();
        let mut cursor = self
            .collection::<Appointment>(APPOINTMENT_COLLECTION_NAME)
            .find(conflict_filter(data.teacher_id, &data.date), None)
            .await?;

        while let Some(result) = cursor.next().await {
            let candidate = result.map_err(Problem::from)?;
            if candidate.time_range().overlaps(&requested) {
                return Err(problem::slot_taken());
            }
        }

        let appointment = data.into_appointment(student_id);
        self.collection(APPOINTMENT_COLLECTION_NAME)
            .insert_one(bson::to_document(&appointment)?, None)
            .await?;

        let mut resp = AppointmentResponse::from(appointment).with_teacher(&teacher);
        if let Some(student) = self.get_user(student_id).await? {
            resp = resp.with_student(&student);
        }

        Ok(resp)
    }

    async fn update_appointment(
        &self,
        auth: &UserRoleToken,
        id: Uuid,
        data: UpdateAppointmentData,
    ) -> Result<AppointmentResponse, Problem> {
        let appointment = self
            .get_appointment(id)
            .await?
            .ok_or_else(|| problem::not_found(id))?;

        if !can_modify(auth, &appointment) {
            return Err(problem::not_related(auth.role, "update"));
        }

        let updates = data
            .update_document(appointment.status)
            .ok_or_else(problem::no_updates)?;

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection::<Appointment>(APPOINTMENT_COLLECTION_NAME)
            .find_one_and_update(filter::by_id(id), doc! { "$set": updates }, options)
            .await?
            .ok_or_else(|| problem::not_found(id))?;

        enrich_both(self, updated).await
    }

    async fn delete_appointment(&self, auth: &UserRoleToken, id: Uuid) -> Result<Uuid, Problem> {
        let appointment = self
            .get_appointment(id)
            .await?
            .ok_or_else(|| problem::not_found(id))?;

        if !can_modify(auth, &appointment) {
            return Err(problem::not_related(auth.role, "delete"));
        }

        self.collection::<Appointment>(APPOINTMENT_COLLECTION_NAME)
            .delete_one(filter::by_id(id), None)
            .await?;

        Ok(id)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, Problem> {
        self.collection(APPOINTMENT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn teacher_schedule(
        &self,
        teacher_id: Uuid,
        date: Option<CalendarDate>,
    ) -> Result<TeacherScheduleResponse, Problem> {
        let options = FindOptions::builder()
            .sort(doc! { "day_of_week": 1, "start_time": 1 })
            .build();

        let mut cursor = self
            .collection::<AvailabilitySlot>(AVAILABILITY_COLLECTION_NAME)
            .find(doc! { "teacher_id": filter::uuid_bson(teacher_id) }, options)
            .await?;

        let mut availability = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(slot) => availability.push(AvailabilitySlotResponse::from(slot)),
                Err(_) => {
                    tracing::warn!("Unable to deserialize AvailabilitySlot document.")
                }
            }
        }

        let mut appointments = vec![];
        if let Some(date) = date {
            let options = FindOptions::builder().sort(doc! { "start_time": 1 }).build();
            let mut cursor = self
                .collection::<Appointment>(APPOINTMENT_COLLECTION_NAME)
                .find(conflict_filter(teacher_id, &date), options)
                .await?;

            while let Some(result) = cursor.next().await {
                match result {
                    Ok(apt) => appointments.push(AppointmentResponse::from(apt)),
                    Err(_) => {
                        tracing::warn!("Unable to deserialize Appointment document.")
                    }
                }
            }
        }

        Ok(TeacherScheduleResponse {
            availability,
            appointments,
        })
    }
}

async fn enrich_both(db: &Database, apt: Appointment) -> Result<AppointmentResponse, Problem> {
    let student = db.get_user(apt.student_id).await?;
    let teacher = db.get_user(apt.teacher_id).await?;

    let mut resp = AppointmentResponse::from(apt);
    if let Some(student) = student {
        resp = resp.with_student(&student);
    }
    if let Some(teacher) = teacher {
        resp = resp.with_teacher(&teacher);
    }
    Ok(resp)
}

async fn lookup_users(db: &Database, ids: Vec<Uuid>) -> Result<HashMap<Uuid, User>, Problem> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let id_list: Vec<_> = ids.into_iter().map(filter::uuid_bson).collect();
    let mut cursor = db
        .collection::<User>(crate::data::user::USER_COLLECTION_NAME)
        .find(doc! { "_id": { "$in": id_list } }, None)
        .await?;

    let mut users = HashMap::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => {
                users.insert(user.id, user);
            }
            Err(_) => {
                tracing::warn!("Unable to deserialize User document.")
            }
        }
    }

    Ok(users)
}
