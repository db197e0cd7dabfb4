use crate::{
    api::{attendance, feed, holiday, leave_request, reports, team, wfh},
    auth::{handlers, middleware::auth_middleware, profile},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond((60_000 / requests_per_min as u64).max(1))
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .expect("rate limiter period and burst are non-zero");
        Governor::new(&cfg)
    }

    let otp_limiter = Arc::new(build_limiter(config.rate_otp_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/send-otp")
                    .wrap(otp_limiter.clone())
                    .route(web::post().to(handlers::send_otp)),
            )
            .service(
                web::resource("/verify-otp")
                    .wrap(otp_limiter.clone())
                    .route(web::post().to(handlers::verify_otp)),
            )
            .service(
                web::resource("/send-email-otp")
                    .wrap(otp_limiter.clone())
                    .route(web::post().to(handlers::send_email_otp)),
            )
            .service(
                web::resource("/verify-email-otp")
                    .wrap(otp_limiter.clone())
                    .route(web::post().to(handlers::verify_email_otp)),
            )
            .service(
                web::resource("/login")
                    .wrap(otp_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Approve/reject links opened from reviewer mailboxes; the signed token is the credential
    cfg.service(
        web::resource("/leaves/email-action/{id}/{action}")
            .wrap(refresh_limiter.clone())
            .route(web::get().to(leave_request::leave_email_action)),
    )
    .service(
        web::resource("/wfh/email-action/{id}/{action}")
            .wrap(refresh_limiter)
            .route(web::get().to(wfh::wfh_email_action)),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::resource("/auth/profile/{employee_id}")
                    .route(web::get().to(profile::get_profile)),
            )
            .service(
                web::scope("/team")
                    // /team
                    .service(
                        web::resource("")
                            .route(web::get().to(team::list_teams))
                            .route(web::post().to(team::create_team)),
                    )
                    // static paths before /team/{id}
                    .service(
                        web::resource("/members")
                            .route(web::get().to(team::list_members))
                            .route(web::post().to(team::create_member)),
                    )
                    .service(
                        web::resource("/members/{id}")
                            .route(web::put().to(team::update_member))
                            .route(web::delete().to(team::delete_member)),
                    )
                    .service(web::resource("/registry").route(web::get().to(team::registry)))
                    .service(web::resource("/designations").route(web::get().to(team::designations)))
                    .service(web::resource("/stats").route(web::get().to(team::team_stats)))
                    // /team/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(team::update_team))
                            .route(web::delete().to(team::delete_team)),
                    )
                    .service(
                        web::resource("/{id}/members")
                            .route(web::post().to(team::add_team_member)),
                    )
                    .service(
                        web::resource("/{id}/members/{employee_id}")
                            .route(web::delete().to(team::remove_team_member)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("/clock").route(web::post().to(attendance::clock)))
                    .service(
                        web::resource("/status/{employee_id}")
                            .route(web::get().to(attendance::status)),
                    )
                    .service(
                        web::resource("/stats/{employee_id}")
                            .route(web::get().to(attendance::stats)),
                    )
                    .service(
                        web::resource("/history/{employee_id}")
                            .route(web::get().to(attendance::history)),
                    )
                    .service(
                        web::resource("/resolve-location")
                            .route(web::post().to(attendance::resolve_location)),
                    )
                    .service(
                        web::resource("/regularize")
                            .route(web::post().to(attendance::regularize)),
                    )
                    .service(
                        web::resource("/regularization-requests/{employee_id}")
                            .route(web::get().to(attendance::regularization_requests)),
                    )
                    .service(
                        web::resource("/regularization/{id}/action")
                            .route(web::post().to(attendance::regularization_action)),
                    ),
            )
            .service(
                web::resource("/holidays")
                    .route(web::get().to(holiday::list_holidays))
                    .route(web::post().to(holiday::create_holiday)),
            )
            .service(
                web::scope("/leaves")
                    .service(web::resource("/apply").route(web::post().to(leave_request::apply_leave)))
                    .service(
                        web::resource("/pending").route(web::get().to(leave_request::pending_leaves)),
                    )
                    .service(
                        web::resource("/types").route(web::get().to(leave_request::list_leave_types)),
                    )
                    .service(
                        web::resource("/allocations")
                            .route(web::post().to(leave_request::allocate_leaves)),
                    )
                    .service(
                        web::resource("/balance/{employee_id}")
                            .route(web::get().to(leave_request::leave_balance)),
                    )
                    .service(
                        web::resource("/{id}/action")
                            .route(web::post().to(leave_request::leave_action)),
                    )
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::post().to(leave_request::cancel_leave)),
                    )
                    // /leaves/{employee_id}
                    .service(
                        web::resource("/{employee_id}")
                            .route(web::get().to(leave_request::employee_leaves)),
                    ),
            )
            .service(
                web::scope("/wfh")
                    .service(web::resource("/apply").route(web::post().to(wfh::apply_wfh)))
                    .service(web::resource("/pending").route(web::get().to(wfh::pending_wfh)))
                    .service(web::resource("/{id}/action").route(web::post().to(wfh::wfh_action)))
                    .service(web::resource("/{id}/cancel").route(web::post().to(wfh::cancel_wfh)))
                    // /wfh/{employee_id}
                    .service(web::resource("/{employee_id}").route(web::get().to(wfh::employee_wfh))),
            )
            .service(
                web::scope("/posts")
                    .service(
                        web::resource("")
                            .route(web::get().to(feed::list_posts))
                            .route(web::post().to(feed::create_post)),
                    )
                    .service(web::resource("/{id}").route(web::delete().to(feed::delete_post)))
                    .service(web::resource("/{id}/like").route(web::post().to(feed::toggle_like)))
                    .service(web::resource("/{id}/comment").route(web::post().to(feed::add_comment))),
            )
            .service(
                web::scope("/admin")
                    .service(
                        web::resource("/monthly-report")
                            .route(web::get().to(reports::get_monthly_report)),
                    )
                    .service(
                        web::resource("/monthly-report/send")
                            .route(web::post().to(reports::send_monthly_report)),
                    )
                    .service(
                        web::resource("/dashboard-stats")
                            .route(web::get().to(team::dashboard_stats)),
                    ),
            ),
    );
}

// OTP LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new token pair, old refresh token revoked
