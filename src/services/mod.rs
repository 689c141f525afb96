mod auth_service;
mod authz_service;
mod course_service;
mod event_service;
mod lead_service;
mod stripe_service;
mod thread_service;

pub use auth_service::*;
pub use authz_service::*;
pub use course_service::*;
pub use event_service::*;
pub use lead_service::*;
pub use stripe_service::*;
pub use thread_service::*;
