use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Employee business code, or the admin code
    pub user_key: String,
    pub name: String,
    pub role: Role,

    /// Present only if this identity is linked to an employee record
    pub employee_id: Option<u64>,
}

impl AuthUser {
    /// Validates an access token and turns its claims into an identity.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, String> {
        let claims = verify_token(token, secret)?;

        if claims.token_type != TokenType::Access {
            return Err("Access token required".to_string());
        }

        let role = Role::from_id(claims.role).ok_or_else(|| "Invalid role".to_string())?;

        Ok(AuthUser {
            user_key: claims.sub,
            name: claims.name,
            role,
            employee_id: claims.employee_id,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by the auth middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ApiError::Unauthorized("Missing token".into()).into())),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ApiError::Internal.into())),
        };

        ready(
            AuthUser::from_token(token, &config.jwt_secret)
                .map_err(|e| ApiError::Unauthorized(e).into()),
        )
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_manager_or_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Manager)
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    pub fn require_manager_or_admin(&self) -> ApiResult<()> {
        if self.is_manager_or_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Manager/Admin only"))
        }
    }

    /// The caller's own employee row id.
    pub fn require_employee_id(&self) -> ApiResult<u64> {
        self.employee_id
            .ok_or_else(|| ApiError::forbidden("No employee profile"))
    }

    /// Employees act on their own records; managers and admins on anyone's.
    pub fn require_self_or_reviewer(&self, employee_id: u64) -> ApiResult<()> {
        if self.is_manager_or_admin() || self.employee_id == Some(employee_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Not allowed to access another employee's records"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};

    fn subject(role: Role) -> TokenSubject {
        TokenSubject {
            sub: "MW-007".into(),
            name: "Ravi Kumar".into(),
            role: role.id(),
            employee_id: Some(7),
        }
    }

    #[test]
    fn access_tokens_become_identities() {
        let token = generate_access_token(&subject(Role::Manager), "s3cret", 60).unwrap();
        let user = AuthUser::from_token(&token, "s3cret").unwrap();
        assert_eq!(user.user_key, "MW-007");
        assert_eq!(user.role, Role::Manager);
        assert!(user.require_manager_or_admin().is_ok());
        assert!(user.require_admin().is_err());
    }

    #[test]
    fn refresh_tokens_are_not_accepted_as_access() {
        let (token, _) = generate_refresh_token(&subject(Role::Employee), "s3cret", 60).unwrap();
        assert!(AuthUser::from_token(&token, "s3cret").is_err());
    }

    #[test]
    fn employees_only_reach_their_own_records() {
        let token = generate_access_token(&subject(Role::Employee), "s3cret", 60).unwrap();
        let user = AuthUser::from_token(&token, "s3cret").unwrap();
        assert!(user.require_self_or_reviewer(7).is_ok());
        assert!(user.require_self_or_reviewer(8).is_err());
        assert_eq!(user.require_employee_id().unwrap(), 7);
    }
}
