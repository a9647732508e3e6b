use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome::{Error as Failure, Success};
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

pub static AUTH_COOKIE_NAME: &str = "jwt_auth";

mod unix_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(date.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = i64::deserialize(d)?;
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("invalid unix timestamp"))
    }
}

/// Authenticated-caller claims: every core operation receives the caller's
/// identity and role through this token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "unix_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
}

impl UserRoleToken {
    pub fn new(user: &User) -> UserRoleToken {
        let now = Utc::now();
        UserRoleToken {
            iat: now,
            exp: now + Duration::weeks(1),
            user: user.id,
            role: user.role,
        }
    }

    pub fn encode_jwt(
        &self,
        private_key: impl AsRef<[u8]>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::PS256);
        let key = EncodingKey::from_rsa_pem(private_key.as_ref())
            .expect("user_auth private key isn't valid. Unable to encode JWT.");

        encode(&header, &self, &key)
    }

    pub fn cookie(
        &self,
        private_key: impl AsRef<[u8]>,
    ) -> Result<Cookie<'static>, jsonwebtoken::errors::Error> {
        Ok(Cookie::build((AUTH_COOKIE_NAME, self.encode_jwt(private_key)?))
            .secure(true)
            .expires(OffsetDateTime::from_unix_timestamp(self.exp.timestamp()).ok())
            .path("/")
            .http_only(true)
            .build())
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

fn decode_token(token: &str, public_key: impl AsRef<[u8]>) -> Result<UserRoleToken, Problem> {
    decode::<UserRoleToken>(
        token,
        &DecodingKey::from_rsa_pem(public_key.as_ref())
            .expect("user_auth public key isn't valid. Unable to decode JWT."),
        &Validation::new(Algorithm::PS256),
    )
    .map(|data| data.claims)
    .map_err(|_| auth_problem("JWT was malformed or expired."))
}

pub fn extract_claims(
    cookies: &CookieJar,
    public_key: impl AsRef<[u8]>,
) -> Result<UserRoleToken, Problem> {
    let auth_cookie = cookies.get(AUTH_COOKIE_NAME);
    let token = match auth_cookie {
        Some(jwt) => jwt.value().to_owned(),
        None => {
            return Err(auth_problem("No JWT auth cookie."));
        }
    };
    tracing::debug!("extracted jwt auth from cookie");

    decode_token(&token, public_key)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security: &Security = req
            .rocket()
            .state()
            .expect("Security must be managed by the rocket instance");

        // Header auth is what non-browser clients use; cookie auth is what
        // the web frontend gets on login.
        let bearer = req
            .headers()
            .get_one("Authorization")
            .and_then(|it| it.strip_prefix("Bearer "));

        let claims = match bearer {
            Some(token) => decode_token(token, &security.jwt_keys.public),
            None => extract_claims(req.cookies(), &security.jwt_keys.public),
        };

        match claims {
            Ok(it) => {
                tracing::trace!("decoded user role token for user: {}", it.user);
                Success(it)
            }
            Err(e) => {
                tracing::debug!("unable to extract auth claims from request");
                Failure((Status::Unauthorized, e))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> SecurityScheme {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            let c = openapi.components.as_mut().unwrap();
            c.add_security_scheme("jwt", *self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_serialize_with_unix_second_timestamps() {
        let now = Utc::now();
        let urt = UserRoleToken {
            iat: now,
            exp: now + Duration::weeks(1),
            user: Uuid::new_v4(),
            role: Role::Teacher,
        };

        let value = serde_json::to_value(&urt).expect("claims must serialize");
        assert_eq!(value["iat"], serde_json::json!(now.timestamp()));
        assert_eq!(value["exp"], serde_json::json!((now + Duration::weeks(1)).timestamp()));
        assert_eq!(value["role"], serde_json::json!("teacher"));

        let back: UserRoleToken = serde_json::from_value(value).expect("claims must deserialize");
        assert_eq!(back.user, urt.user);
        assert_eq!(back.role, Role::Teacher);
    }
}
