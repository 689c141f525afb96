mod auth;
mod calendar;
mod courses;
mod events;
mod leads;
mod stripe;
mod threads;

use axum::Router;

use crate::AppState;

pub use auth::callback;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes(state))
        .nest("/leads", leads::routes(state))
        .nest("/threads", threads::routes(state))
        .nest("/comments", threads::comment_routes(state))
        .nest("/courses", courses::routes(state))
        .nest("/modules", courses::module_routes(state))
        .nest("/lessons", courses::lesson_routes(state))
        .nest("/events", events::routes(state))
        .nest("/stripe", stripe::routes(state))
        .nest("/calendar", calendar::routes(state))
}
