use mongodb::Database;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;

use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{
    CreateUserData, LoginData, PasswordUpdateData, ProfileUpdateData, RegisterData, UserDbExt,
};
use crate::data::user::UserResponse;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::security::Security;

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

async fn issue_token<'a>(
    user: &crate::data::user::User,
    security: &Security,
    cookies: &'a CookieJar<'_>,
) -> Result<String, Problem> {
    let urt = UserRoleToken::new(user);
    let token = urt.encode_jwt(&security.jwt_keys.private)?;
    cookies.add(urt.cookie(&security.jwt_keys.private)?);
    Ok(token)
}

/// Public registration; always creates a student account.
#[utoipa::path(
    request_body = RegisterData,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid or already registered email", body = Problem),
    )
)]
#[post("/auth/register", format = "application/json", data = "<register>")]
#[tracing::instrument(skip(cookies, db, security))]
pub async fn register<'a>(
    register: Json<RegisterData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    security: &State<Security>,
) -> Result<Json<AuthResponse>, Problem> {
    register.validate()?;

    let user = db.register_student(register.into_inner()).await?;
    let token = issue_token(&user, security, cookies).await?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[utoipa::path(
    request_body = LoginData,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Bad email or password", body = Problem),
    )
)]
#[post("/auth/login", format = "application/json", data = "<login>")]
#[tracing::instrument(skip(cookies, db, security))]
pub async fn login_submit<'a>(
    login: Json<LoginData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    security: &State<Security>,
) -> Result<Json<AuthResponse>, Problem> {
    login.validate()?;

    let user = db
        .find_user_by_email(&login.email)
        .await?
        .ok_or_else(user_problem::bad_login)?;

    if !user.pw_hash.matches(&login.password) {
        return Err(user_problem::bad_login());
    }

    let token = issue_token(&user, security, cookies).await?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Admin-only creation of teacher and admin accounts.
#[utoipa::path(
    request_body = CreateUserData,
    responses(
        (status = 200, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input or role", body = Problem),
        (status = 403, description = "Caller is not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/auth/create-user", format = "application/json", data = "<create_user>")]
#[tracing::instrument(skip(db))]
pub async fn user_create(
    create_user: Json<CreateUserData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<UserResponse>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden(
            "Only admins can create teacher or admin accounts.",
        ));
    }

    create_user.validate()?;

    let user = db.create_user(create_user.into_inner()).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    responses(
        (status = 200, description = "Caller's own account", body = UserResponse),
    ),
    security(("jwt" = []))
)]
#[get("/user/profile")]
#[tracing::instrument(skip(db))]
pub async fn profile_get(
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<UserResponse>, Problem> {
    let user = db
        .get_user(auth.user)
        .await?
        .ok_or_else(|| user_problem::not_found(auth.user))?;

    Ok(Json(user.into()))
}

/// Update display name and/or email. Role is never touched here.
#[utoipa::path(
    request_body = ProfileUpdateData,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "No updates or email taken", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/profile", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn profile_update(
    update: Json<ProfileUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<UserResponse>, Problem> {
    let user = db.update_profile(auth.user, update.into_inner()).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    request_body = PasswordUpdateData,
    responses(
        (status = 200, description = "Password replaced"),
        (status = 400, description = "Current password incorrect", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/password", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn password_update(
    update: Json<PasswordUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<(), Problem> {
    db.update_password(auth.user, update.into_inner()).await
}

/// All teacher accounts, for the booking picker.
#[utoipa::path(
    responses(
        (status = 200, description = "Teacher accounts", body = Vec<UserResponse>),
    ),
    security(("jwt" = []))
)]
#[get("/user/teachers")]
#[tracing::instrument(skip(db))]
pub async fn teacher_list(
    _auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    let teachers = db.list_teachers().await?;
    Ok(Json(teachers.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    responses(
        (status = 200, description = "All accounts", body = Vec<UserResponse>),
        (status = 403, description = "Caller is not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user")]
#[tracing::instrument(skip(db))]
pub async fn user_list(
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can list all accounts."));
    }

    let users = db.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
