use crate::api::EmployeeKey;
use crate::api::attendance::{
    ClockReq, ClockResponse, DaySummary, HistoryDay, LocationReq, PairView, RegularizationActionReq,
    RegularizationView, RegularizeReq,
};
use crate::api::feed::{CommentView, CreateComment, CreatePost, PostView};
use crate::api::holiday::CreateHoliday;
use crate::api::leave_request::{ApplyLeave, BalanceLine, LeaveView};
use crate::api::reports::{MonthlyReport, ReportRow};
use crate::api::review::ActionBody;
use crate::api::team::{AddMember, CreateMember, CreateTeam, MemberCard, TeamResponse, TeamStats};
use crate::api::wfh::{ApplyWfh, WfhView};
use crate::auth::handlers::LoginResponse;
use crate::auth::profile::{Profile, TeamRef};
use crate::model::employee::Employee;
use crate::model::holiday::Holiday;
use crate::model::leave_request::LeaveType;
use crate::model::status::{PunchType, RequestAction, RequestStatus};
use crate::model::team::Team;
use crate::models::{SendEmailOtpReq, SendPhoneOtpReq, VerifyEmailOtpReq, VerifyPhoneOtpReq};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Portal API",
        version = "1.0.0",
        description = r#"
## HR Portal

Backend for an internal HR portal: who works here, when they clock in, and
how their time off gets approved.

### 🔹 Key Features
- **Authentication**
  - One-time codes over WhatsApp or email, JWT access and refresh tokens
- **Teams & Registry**
  - Teams, memberships, employee records and weekly team stats
- **Attendance**
  - Clock in/out punches, daily summaries, history and regularization
- **Leave & WFH**
  - Applications, balances, manager approvals and one-click email actions
- **Feed**
  - Company posts with likes and comments
- **Reports**
  - Monthly attendance and leave report, on screen or by email

### 🔐 Security
Everything under `/api` needs a **JWT Bearer** access token.
Admin-only and manager-only operations answer `403` for other roles.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::send_otp,
        crate::auth::handlers::verify_otp,
        crate::auth::handlers::send_email_otp,
        crate::auth::handlers::verify_email_otp,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::profile::get_profile,

        crate::api::team::list_teams,
        crate::api::team::create_team,
        crate::api::team::update_team,
        crate::api::team::delete_team,
        crate::api::team::add_team_member,
        crate::api::team::remove_team_member,
        crate::api::team::list_members,
        crate::api::team::create_member,
        crate::api::team::update_member,
        crate::api::team::delete_member,
        crate::api::team::registry,
        crate::api::team::designations,
        crate::api::team::team_stats,
        crate::api::team::dashboard_stats,

        crate::api::attendance::clock,
        crate::api::attendance::status,
        crate::api::attendance::stats,
        crate::api::attendance::history,
        crate::api::attendance::resolve_location,
        crate::api::attendance::regularize,
        crate::api::attendance::regularization_requests,
        crate::api::attendance::regularization_action,

        crate::api::holiday::list_holidays,
        crate::api::holiday::create_holiday,

        crate::api::leave_request::apply_leave,
        crate::api::leave_request::pending_leaves,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::employee_leaves,
        crate::api::leave_request::leave_action,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::leave_email_action,
        crate::api::leave_request::list_leave_types,
        crate::api::leave_request::allocate_leaves,

        crate::api::wfh::apply_wfh,
        crate::api::wfh::employee_wfh,
        crate::api::wfh::pending_wfh,
        crate::api::wfh::wfh_action,
        crate::api::wfh::cancel_wfh,
        crate::api::wfh::wfh_email_action,

        crate::api::feed::list_posts,
        crate::api::feed::create_post,
        crate::api::feed::delete_post,
        crate::api::feed::toggle_like,
        crate::api::feed::add_comment,

        crate::api::reports::get_monthly_report,
        crate::api::reports::send_monthly_report
    ),
    components(
        schemas(
            SendPhoneOtpReq,
            VerifyPhoneOtpReq,
            SendEmailOtpReq,
            VerifyEmailOtpReq,
            LoginResponse,
            Profile,
            TeamRef,
            EmployeeKey,
            Employee,
            Team,
            TeamResponse,
            CreateTeam,
            AddMember,
            MemberCard,
            CreateMember,
            TeamStats,
            ClockReq,
            ClockResponse,
            DaySummary,
            HistoryDay,
            PairView,
            LocationReq,
            RegularizeReq,
            RegularizationView,
            RegularizationActionReq,
            Holiday,
            CreateHoliday,
            LeaveType,
            ApplyLeave,
            LeaveView,
            BalanceLine,
            ApplyWfh,
            WfhView,
            ActionBody,
            RequestAction,
            RequestStatus,
            PunchType,
            CreatePost,
            CreateComment,
            PostView,
            CommentView,
            MonthlyReport,
            ReportRow
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "OTP login, tokens and profiles"),
        (name = "Team", description = "Teams and the employee registry"),
        (name = "Attendance", description = "Clock in/out, history and regularization"),
        (name = "Holidays", description = "Public holiday calendar"),
        (name = "Leave", description = "Leave applications, balances and approvals"),
        (name = "WFH", description = "Work-from-home requests"),
        (name = "Feed", description = "Company feed"),
        (name = "Admin", description = "Reports and dashboard"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
