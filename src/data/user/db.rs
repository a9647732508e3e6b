use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::util::normalize_email;

use super::{PasswordHash, User, USER_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_full_name() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad display name.")
            .detail("Display name must not be blank.")
            .to_owned()
    }

    #[inline]
    pub fn bad_role() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad role.")
            .detail("Only teacher or admin accounts can be created here.")
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Bad email or password.")
    }
}

fn by_email(email: impl AsRef<str>) -> Document {
    doc! { "email": normalize_email(email) }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), Problem> {
    if !email.contains('@') {
        return Err(problem::bad_email(email, "Not a valid e-mail address."));
    }

    if password.len() < 8 {
        return Err(problem::bad_password(
            "Password must be at least 8 characters (bytes) long.",
        ));
    }

    if password.len() > 1024 {
        return Err(problem::bad_password(
            "Passwords longer than 1024 characters aren't supported.",
        ));
    }

    Ok(())
}

/// Public self-registration. Always produces a student account.
#[derive(Clone, Deserialize, ToSchema)]
pub struct RegisterData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub full_name: String,
}

impl std::fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterData:{}", self.email)
    }
}

impl RegisterData {
    pub fn validate(&self) -> Result<(), Problem> {
        validate_credentials(&self.email, &self.password)?;
        if self.full_name.trim().is_empty() {
            return Err(problem::bad_full_name());
        }
        Ok(())
    }
}

/// Admin-only account creation; the only path that can mint teacher and
/// admin roles.
#[derive(Clone, Deserialize, ToSchema)]
pub struct CreateUserData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

impl std::fmt::Debug for CreateUserData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CreateUserData:{}:{}", self.email, self.role)
    }
}

impl CreateUserData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.role.admin_assignable() {
            return Err(problem::bad_role());
        }
        validate_credentials(&self.email, &self.password)?;
        if self.full_name.trim().is_empty() {
            return Err(problem::bad_full_name());
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginData {
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for LoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoginData:{}", self.email)
    }
}

impl LoginData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') || self.password.is_empty() {
            return Err(problem::bad_login());
        }
        Ok(())
    }
}

/// Partial profile edit. Role is deliberately absent: it is immutable
/// through this path.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileUpdateData {
    pub full_name: Option<String>,
    #[schema(format = "email")]
    pub email: Option<String>,
}

impl ProfileUpdateData {
    /// `None` when no recognized field was supplied.
    pub fn update_document(&self) -> Option<Document> {
        let mut updates = Document::new();

        if let Some(name) = &self.full_name {
            if !name.trim().is_empty() {
                updates.insert("full_name", name.clone());
            }
        }
        if let Some(email) = &self.email {
            updates.insert("email", normalize_email(email));
        }

        if updates.is_empty() {
            None
        } else {
            Some(updates)
        }
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct PasswordUpdateData {
    #[schema(format = "password")]
    pub current_password: String,
    #[schema(format = "password")]
    pub new_password: String,
}

impl std::fmt::Debug for PasswordUpdateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordUpdateData")
    }
}

pub trait UserDbExt {
    async fn insert_account(&self, user: User) -> Result<User, Problem>;

    async fn register_student(&self, data: RegisterData) -> Result<User, Problem>;
    async fn create_user(&self, data: CreateUserData) -> Result<User, Problem>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem>;
    async fn get_user_with_role(&self, id: Uuid, role: Role) -> Result<Option<User>, Problem>;
    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem>;

    async fn list_users(&self) -> Result<Vec<User>, Problem>;
    async fn list_teachers(&self) -> Result<Vec<User>, Problem>;
    async fn count_admins(&self) -> Result<u64, Problem>;

    async fn update_profile(&self, id: Uuid, data: ProfileUpdateData) -> Result<User, Problem>;
    async fn update_password(&self, id: Uuid, data: PasswordUpdateData) -> Result<(), Problem>;
}

impl UserDbExt for Database {
    async fn insert_account(&self, user: User) -> Result<User, Problem> {
        if self.find_user_by_email(&user.email).await?.is_some() {
            return Err(problem::bad_email(&user.email, "Email already registered."));
        }

        self.collection(USER_COLLECTION_NAME)
            .insert_one(bson::to_document(&user)?, None)
            .await?;

        Ok(user)
    }

    async fn register_student(&self, data: RegisterData) -> Result<User, Problem> {
        // Public registration always produces a student account.
        self.insert_account(User::new(
            &data.email,
            data.full_name.trim(),
            &data.password,
            Role::Student,
        ))
        .await
    }

    async fn create_user(&self, data: CreateUserData) -> Result<User, Problem> {
        self.insert_account(User::new(
            &data.email,
            data.full_name.trim(),
            &data.password,
            data.role,
        ))
        .await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn get_user_with_role(&self, id: Uuid, role: Role) -> Result<Option<User>, Problem> {
        let mut f = filter::by_id(id);
        f.insert("role", role.to_string());

        self.collection(USER_COLLECTION_NAME)
            .find_one(f, None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(by_email(email), None)
            .await
            .map_err(Problem::from)
    }

    async fn list_users(&self) -> Result<Vec<User>, Problem> {
        collect_users(self, None).await
    }

    async fn list_teachers(&self) -> Result<Vec<User>, Problem> {
        collect_users(self, Some(doc! { "role": Role::Teacher.to_string() })).await
    }

    async fn count_admins(&self) -> Result<u64, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .count_documents(doc! { "role": Role::Admin.to_string() }, None)
            .await
            .map_err(Problem::from)
    }

    async fn update_profile(&self, id: Uuid, data: ProfileUpdateData) -> Result<User, Problem> {
        let updates = data
            .update_document()
            .ok_or_else(|| crate::resp::problem::problems::invalid_input("No updates provided."))?;

        if let Ok(email) = updates.get_str("email") {
            match self.find_user_by_email(email).await? {
                Some(existing) if existing.id != id => {
                    return Err(problem::bad_email(email, "Email already registered."));
                }
                _ => {}
            }
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_update(filter::by_id(id), doc! { "$set": updates }, options)
            .await?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn update_password(&self, id: Uuid, data: PasswordUpdateData) -> Result<(), Problem> {
        let user = self.get_user(id).await?.ok_or_else(|| problem::not_found(id))?;

        if !user.pw_hash.matches(&data.current_password) {
            return Err(problem::bad_password("Current password is incorrect."));
        }
        if data.new_password.len() < 8 {
            return Err(problem::bad_password(
                "Password must be at least 8 characters (bytes) long.",
            ));
        }

        self.collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                filter::by_id(id),
                doc! { "$set": { "pw_hash": bson::to_bson(&PasswordHash::new(&data.new_password))? } },
                None,
            )
            .await?;

        Ok(())
    }
}

async fn collect_users(db: &Database, f: Option<Document>) -> Result<Vec<User>, Problem> {
    let mut cursor = db
        .collection::<User>(USER_COLLECTION_NAME)
        .find(f, None)
        .await?;

    let mut users = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(user),
            Err(_) => {
                tracing::warn!("Unable to deserialize User document.")
            }
        }
    }

    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_data_requires_plausible_credentials() {
        let ok = RegisterData {
            email: "kid@school.edu".to_string(),
            password: "longenough".to_string(),
            full_name: "A Kid".to_string(),
        };
        assert!(ok.validate().is_ok());

        let mut bad_email = ok.clone();
        bad_email.email = "not-an-email".to_string();
        assert!(bad_email.validate().is_err());

        let mut short_pw = ok.clone();
        short_pw.password = "short".to_string();
        assert!(short_pw.validate().is_err());

        let mut blank_name = ok;
        blank_name.full_name = "   ".to_string();
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn create_user_data_rejects_student_role() {
        let data = CreateUserData {
            email: "t@school.edu".to_string(),
            password: "longenough".to_string(),
            full_name: "T Eacher".to_string(),
            role: Role::Student,
        };
        assert!(data.validate().is_err());

        let teacher = CreateUserData {
            role: Role::Teacher,
            ..data
        };
        assert!(teacher.validate().is_ok());
    }

    #[test]
    fn profile_update_normalizes_email_and_skips_blank_name() {
        let data = ProfileUpdateData {
            full_name: Some("  ".to_string()),
            email: Some(" New.Mail@School.EDU ".to_string()),
        };

        let doc = data.update_document().expect("email update expected");
        assert!(doc.get("full_name").is_none());
        assert_eq!(doc.get_str("email").unwrap(), "new.mail@school.edu");
    }

    #[test]
    fn empty_profile_update_produces_no_document() {
        assert!(ProfileUpdateData::default().update_document().is_none());
    }
}
