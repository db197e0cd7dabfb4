pub mod attendance;
pub mod employee;
pub mod holiday;
pub mod leave_request;
pub mod post;
pub mod regularization;
pub mod role;
pub mod status;
pub mod team;
pub mod work_from_home;
