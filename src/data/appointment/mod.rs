use bson::{doc, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::filter;
use crate::data::time::{CalendarDate, ClockTime, TimeRange};
use crate::data::user::User;
use crate::resp::jwt::UserRoleToken;
use crate::role::Role;

pub static APPOINTMENT_COLLECTION_NAME: &str = "appointment";

/// Appointment lifecycle states. `Rejected` and `Cancelled` are terminal
/// for conflict purposes: they stop occupying their slot but the record
/// stays around and can still be transitioned again.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Rejected | AppointmentStatus::Cancelled)
    }

    /// Statuses that do not block a slot, in their wire spelling. Used by
    /// the `$nin` clause of conflict and schedule queries.
    pub fn terminal_names() -> [&'static str; 2] {
        ["cancelled", "rejected"]
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Approved => write!(f, "approved"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "approved" => Ok(AppointmentStatus::Approved),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// The transition policy. Deliberately liberal: any authorized caller may
/// move an appointment between any two states, including reviving a
/// terminal one. Kept as the single decision point so a stricter graph can
/// be substituted without touching callers.
pub fn transition_allowed(_from: AppointmentStatus, _to: AppointmentStatus) -> bool {
    true
}

/// A requested meeting between one student and one teacher. Holds weak
/// references to both accounts; deleting an account does not cascade here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(
        default = "Uuid::new_v4",
        rename = "_id",
        with = "bson::serde_helpers::uuid_1_as_binary"
    )]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub student_id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub teacher_id: Uuid,
    pub date: CalendarDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub subject: String,
    #[serde(default)]
    pub notes: String,
    pub status: AppointmentStatus,
    #[serde(
        default = "Utc::now",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub created: DateTime<Utc>,
}

impl Appointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time.clone(), self.end_time.clone())
    }
}

/// Caller relationship check shared by update and delete: students reach
/// their own appointments, teachers the ones assigned to them, admins all.
pub fn can_modify(auth: &UserRoleToken, appointment: &Appointment) -> bool {
    match auth.role {
        Role::Student => appointment.student_id == auth.user,
        Role::Teacher => appointment.teacher_id == auth.user,
        Role::Admin => true,
    }
}

/// Role-scoped listing filter: a student only ever matches appointments
/// where they are the student, a teacher where they are the teacher, and
/// an admin matches everything.
pub fn list_filter(auth: &UserRoleToken) -> Document {
    match auth.role {
        Role::Student => doc! { "student_id": filter::uuid_bson(auth.user) },
        Role::Teacher => doc! { "teacher_id": filter::uuid_bson(auth.user) },
        Role::Admin => Document::new(),
    }
}

/// Candidates for the conflict check: same teacher, same date, status not
/// terminal. Overlap itself is decided in-process by [TimeRange::overlaps].
pub fn conflict_filter(teacher_id: Uuid, date: &CalendarDate) -> Document {
    doc! {
        "teacher_id": filter::uuid_bson(teacher_id),
        "date": date.as_str(),
        "status": { "$nin": AppointmentStatus::terminal_names().to_vec() },
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct CreateAppointmentData {
    pub teacher_id: Uuid,
    pub date: CalendarDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub subject: String,
    pub notes: Option<String>,
    /// Only honored when the caller is not a student; a student always
    /// books for themselves.
    pub student_id: Option<Uuid>,
}

impl std::fmt::Debug for CreateAppointmentData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CreateAppointmentData:{}:{} {}-{}",
            self.teacher_id, self.date, self.start_time, self.end_time
        )
    }
}

impl CreateAppointmentData {
    pub fn validate(&self) -> Result<(), crate::resp::problem::Problem> {
        if self.subject.trim().is_empty() {
            return Err(crate::resp::problem::problems::invalid_input(
                "All required fields must be provided.",
            ));
        }
        Ok(())
    }

    /// The student the appointment is booked for. The identifier supplied
    /// by non-student callers is a weak reference; no existence check is
    /// performed on it.
    pub fn effective_student(
        &self,
        auth: &UserRoleToken,
    ) -> Result<Uuid, crate::resp::problem::Problem> {
        if auth.role == Role::Student {
            return Ok(auth.user);
        }

        self.student_id.ok_or_else(|| {
            crate::resp::problem::problems::invalid_input(
                "A student id is required when booking on a student's behalf.",
            )
        })
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time.clone(), self.end_time.clone())
    }

    pub fn into_appointment(self, student_id: Uuid) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            student_id,
            teacher_id: self.teacher_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            subject: self.subject,
            notes: self.notes.unwrap_or_default(),
            status: AppointmentStatus::Pending,
            created: Utc::now(),
        }
    }
}

/// Partial appointment edit. Absent fields are left untouched; `notes`
/// distinguishes "not provided" from "cleared".
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateAppointmentData {
    /// Applied only when it spells one of the four valid statuses and the
    /// transition policy allows it; silently ignored otherwise.
    pub status: Option<String>,
    pub date: Option<CalendarDate>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub subject: Option<String>,
    pub notes: Option<String>,
}

impl UpdateAppointmentData {
    /// Builds the `$set` payload against the current record. `None` when no
    /// recognized field was supplied. Conflicts and cross-field consistency
    /// are intentionally not re-validated here.
    pub fn update_document(&self, current: AppointmentStatus) -> Option<Document> {
        let mut updates = Document::new();

        if let Some(status) = self
            .status
            .as_deref()
            .and_then(|it| AppointmentStatus::from_str(it).ok())
        {
            if transition_allowed(current, status) {
                updates.insert("status", status.to_string());
            }
        }
        if let Some(date) = &self.date {
            updates.insert("date", date.as_str());
        }
        if let Some(start) = &self.start_time {
            updates.insert("start_time", start.as_str());
        }
        if let Some(end) = &self.end_time {
            updates.insert("end_time", end.as_str());
        }
        if let Some(subject) = &self.subject {
            if !subject.is_empty() {
                updates.insert("subject", subject.clone());
            }
        }
        if let Some(notes) = &self.notes {
            // Explicit empty string clears the notes.
            updates.insert("notes", notes.clone());
        }

        if updates.is_empty() {
            None
        } else {
            Some(updates)
        }
    }
}

/// An appointment joined with the display name/email of its counterpart
/// account(s) for presentation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppointmentResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub date: CalendarDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub subject: String,
    pub notes: String,
    pub status: AppointmentStatus,
    pub created: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_email: Option<String>,
}

impl From<Appointment> for AppointmentResponse {
    fn from(apt: Appointment) -> Self {
        AppointmentResponse {
            id: apt.id,
            student_id: apt.student_id,
            teacher_id: apt.teacher_id,
            date: apt.date,
            start_time: apt.start_time,
            end_time: apt.end_time,
            subject: apt.subject,
            notes: apt.notes,
            status: apt.status,
            created: apt.created,
            student_name: None,
            student_email: None,
            teacher_name: None,
            teacher_email: None,
        }
    }
}

impl AppointmentResponse {
    pub fn with_student(mut self, student: &User) -> Self {
        self.student_name = Some(student.full_name.clone());
        self.student_email = Some(student.email.clone());
        self
    }

    pub fn with_teacher(mut self, teacher: &User) -> Self {
        self.teacher_name = Some(teacher.full_name.clone());
        self.teacher_email = Some(teacher.email.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::time::TimeRange;
    use bson::Bson;
    use chrono::Utc;
    use std::str::FromStr;

    fn token(user: Uuid, role: Role) -> UserRoleToken {
        serde_json::from_value(serde_json::json!({
            "iat": Utc::now().timestamp(),
            "exp": Utc::now().timestamp() + 3600,
            "user": user,
            "role": role.to_string(),
        }))
        .expect("valid test token")
    }

    fn example_appointment(student: Uuid, teacher: Uuid) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            student_id: student,
            teacher_id: teacher,
            date: CalendarDate::from_str("2024-05-01").unwrap(),
            start_time: ClockTime::from_str("09:00").unwrap(),
            end_time: ClockTime::from_str("10:00").unwrap(),
            subject: "Thesis review".to_string(),
            notes: String::new(),
            status: AppointmentStatus::Pending,
            created: Utc::now(),
        }
    }

    #[test]
    fn terminal_statuses_do_not_occupy_slots() {
        assert!(AppointmentStatus::Rejected.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Approved.is_terminal());
    }

    #[test]
    fn status_spellings_round_trip() {
        for s in [
            AppointmentStatus::Pending,
            AppointmentStatus::Approved,
            AppointmentStatus::Rejected,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(AppointmentStatus::from_str(&s.to_string()), Ok(s));
        }
        assert!(AppointmentStatus::from_str("done").is_err());
    }

    #[test]
    fn default_transition_policy_is_liberal() {
        use AppointmentStatus::*;
        for from in [Pending, Approved, Rejected, Cancelled] {
            for to in [Pending, Approved, Rejected, Cancelled] {
                assert!(transition_allowed(from, to));
            }
        }
    }

    #[test]
    fn list_filter_scopes_by_role() {
        let id = Uuid::new_v4();

        let student = list_filter(&token(id, Role::Student));
        assert_eq!(student.get("student_id"), Some(&filter::uuid_bson(id)));
        assert!(student.get("teacher_id").is_none());

        let teacher = list_filter(&token(id, Role::Teacher));
        assert_eq!(teacher.get("teacher_id"), Some(&filter::uuid_bson(id)));
        assert!(teacher.get("student_id").is_none());

        assert!(list_filter(&token(id, Role::Admin)).is_empty());
    }

    #[test]
    fn conflict_filter_excludes_terminal_statuses() {
        let teacher = Uuid::new_v4();
        let date = CalendarDate::from_str("2024-05-01").unwrap();
        let f = conflict_filter(teacher, &date);

        assert_eq!(f.get("teacher_id"), Some(&filter::uuid_bson(teacher)));
        assert_eq!(f.get_str("date").unwrap(), "2024-05-01");

        let nin = f
            .get_document("status")
            .and_then(|d| d.get_array("$nin"))
            .expect("status $nin clause");
        assert!(nin.contains(&Bson::String("cancelled".to_string())));
        assert!(nin.contains(&Bson::String("rejected".to_string())));
        assert!(!nin.contains(&Bson::String("pending".to_string())));
        assert!(!nin.contains(&Bson::String("approved".to_string())));
    }

    #[test]
    fn modification_is_restricted_to_related_callers() {
        let student = Uuid::new_v4();
        let teacher = Uuid::new_v4();
        let apt = example_appointment(student, teacher);

        assert!(can_modify(&token(student, Role::Student), &apt));
        assert!(can_modify(&token(teacher, Role::Teacher), &apt));
        assert!(can_modify(&token(Uuid::new_v4(), Role::Admin), &apt));

        // Unrelated student and unrelated teacher are both rejected.
        assert!(!can_modify(&token(Uuid::new_v4(), Role::Student), &apt));
        assert!(!can_modify(&token(Uuid::new_v4(), Role::Teacher), &apt));
    }

    #[test]
    fn effective_student_is_forced_to_student_callers() {
        let caller = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let data = CreateAppointmentData {
            teacher_id: Uuid::new_v4(),
            date: CalendarDate::from_str("2024-05-01").unwrap(),
            start_time: ClockTime::from_str("09:00").unwrap(),
            end_time: ClockTime::from_str("10:00").unwrap(),
            subject: "Thesis review".to_string(),
            notes: None,
            student_id: Some(someone_else),
        };

        assert_eq!(
            data.effective_student(&token(caller, Role::Student)).unwrap(),
            caller
        );
        assert_eq!(
            data.effective_student(&token(caller, Role::Admin)).unwrap(),
            someone_else
        );

        let without = CreateAppointmentData {
            student_id: None,
            ..data
        };
        assert!(without.effective_student(&token(caller, Role::Teacher)).is_err());
    }

    #[test]
    fn blank_subject_fails_validation() {
        let data = CreateAppointmentData {
            teacher_id: Uuid::new_v4(),
            date: CalendarDate::from_str("2024-05-01").unwrap(),
            start_time: ClockTime::from_str("09:00").unwrap(),
            end_time: ClockTime::from_str("10:00").unwrap(),
            subject: "  ".to_string(),
            notes: None,
            student_id: None,
        };
        assert!(data.validate().is_err());
    }

    #[test]
    fn created_appointment_starts_pending_with_default_notes() {
        let data = CreateAppointmentData {
            teacher_id: Uuid::new_v4(),
            date: CalendarDate::from_str("2024-05-01").unwrap(),
            start_time: ClockTime::from_str("09:00").unwrap(),
            end_time: ClockTime::from_str("10:00").unwrap(),
            subject: "Thesis review".to_string(),
            notes: None,
            student_id: None,
        };
        let apt = data.into_appointment(Uuid::new_v4());

        assert_eq!(apt.status, AppointmentStatus::Pending);
        assert_eq!(apt.notes, "");
        assert_eq!(apt.subject, "Thesis review");
    }

    #[test]
    fn empty_update_produces_no_document() {
        let data = UpdateAppointmentData::default();
        assert!(data.update_document(AppointmentStatus::Pending).is_none());
    }

    #[test]
    fn invalid_status_is_ignored_not_applied() {
        let data = UpdateAppointmentData {
            status: Some("archived".to_string()),
            ..Default::default()
        };
        // The bogus status is dropped; with nothing else supplied the whole
        // update counts as empty.
        assert!(data.update_document(AppointmentStatus::Pending).is_none());
    }

    #[test]
    fn valid_status_and_fields_are_applied() {
        let data = UpdateAppointmentData {
            status: Some("approved".to_string()),
            subject: Some("Grading appeal".to_string()),
            ..Default::default()
        };
        let doc = data
            .update_document(AppointmentStatus::Pending)
            .expect("updates expected");

        assert_eq!(doc.get_str("status").unwrap(), "approved");
        assert_eq!(doc.get_str("subject").unwrap(), "Grading appeal");
        assert!(doc.get("notes").is_none());
    }

    #[test]
    fn explicit_empty_notes_clear_the_field() {
        let data = UpdateAppointmentData {
            notes: Some(String::new()),
            ..Default::default()
        };
        let doc = data
            .update_document(AppointmentStatus::Pending)
            .expect("notes update expected");
        assert_eq!(doc.get_str("notes").unwrap(), "");
    }

    #[test]
    fn empty_subject_is_ignored_like_the_source() {
        let data = UpdateAppointmentData {
            subject: Some(String::new()),
            ..Default::default()
        };
        assert!(data.update_document(AppointmentStatus::Pending).is_none());
    }

    #[test]
    fn appointment_document_round_trips_through_bson() {
        let apt = example_appointment(Uuid::new_v4(), Uuid::new_v4());
        let doc = bson::to_document(&apt).expect("appointment must serialize");

        assert_eq!(doc.get_str("date").unwrap(), "2024-05-01");
        assert_eq!(doc.get_str("start_time").unwrap(), "09:00");
        assert_eq!(doc.get_str("status").unwrap(), "pending");

        let back: Appointment =
            bson::from_document(doc).expect("appointment must deserialize");
        assert_eq!(back.id, apt.id);
        assert_eq!(back.student_id, apt.student_id);
        assert_eq!(back.teacher_id, apt.teacher_id);
        assert_eq!(back.subject, apt.subject);
        assert_eq!(back.status, AppointmentStatus::Pending);
        assert_eq!(
            back.time_range(),
            TimeRange::new(
                ClockTime::from_str("09:00").unwrap(),
                ClockTime::from_str("10:00").unwrap()
            )
        );
    }
}
