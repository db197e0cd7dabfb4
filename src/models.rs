use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct SendPhoneOtpReq {
    /// Registered contact number, or `admin`
    #[schema(example = "+91 98765 43210")]
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyPhoneOtpReq {
    #[schema(example = "9876543210")]
    pub phone: Option<String>,
    #[schema(example = "482913")]
    pub otp: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendEmailOtpReq {
    #[schema(example = "asha.rao@company.com")]
    pub email: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyEmailOtpReq {
    #[schema(example = "asha.rao@company.com")]
    pub email: Option<String>,
    #[schema(example = "482913")]
    pub otp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Employee business code, or the admin code
    pub sub: String,
    pub name: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this identity is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims behind the approve/reject links sent by email.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ActionClaims {
    pub kind: String,
    pub request_id: u64,
    pub exp: usize,
}
