//! Task routes: today, list, create, view, edit, delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::tasks::{TaskInput, TaskView};

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    include_finished: bool,
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::not_found("task", raw))
}

/// GET /
///
/// Up to ten tasks due on the caller's local today.
async fn today(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<Vec<TaskView>>> {
    Ok(Json(state.tasks.today(&identity, Utc::now()).await?))
}

/// GET /tasks
async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TaskView>>> {
    Ok(Json(
        state.tasks.list(&identity, params.include_finished).await?,
    ))
}

/// POST /tasks
async fn create_task(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(input): Json<TaskInput>,
) -> Result<impl IntoResponse> {
    let view = state.tasks.create(&identity, &input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /tasks/{id}
async fn get_task(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TaskView>> {
    Ok(Json(state.tasks.view(&identity, parse_id(&id)?).await?))
}

/// POST /tasks/{id}
async fn edit_task(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<TaskInput>,
) -> Result<Json<TaskView>> {
    Ok(Json(
        state.tasks.edit(&identity, parse_id(&id)?, &input).await?,
    ))
}

/// DELETE /tasks/{id}
async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.tasks.delete(&identity, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(today))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).post(edit_task).delete(delete_task),
        )
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::channels::testing::RecordingChat;
    use crate::web::testing::{TestApp, test_app};

    async fn call(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder
                .header("x-auth-user", user)
                .header("x-auth-email", format!("{user}@example.com"));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn anonymous_requests_get_login_url() {
        let app = test_app(RecordingChat::default()).await;
        let (status, body) = call(&app, request("GET", "/tasks", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["login_url"], "/login?continue=/tasks");
    }

    #[tokio::test]
    async fn create_list_edit_delete() {
        let app = test_app(RecordingChat::default()).await;
        let (status, created) = call(
            &app,
            request(
                "POST",
                "/tasks",
                Some("alice"),
                Some(json!({"description": "Pay rent", "due_on": "2030-01-01 - 09:00:00"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["due_on_local"], "2030-01-01 - 09:00:00 - UTC");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, list) = call(&app, request("GET", "/tasks", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, edited) = call(
            &app,
            request(
                "POST",
                &format!("/tasks/{id}"),
                Some("alice"),
                Some(json!({"description": "Pay rent today", "due_on": "2030-01-02 - 10:00:00"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["description"], "Pay rent today");

        let (status, _) = call(&app, request("DELETE", &format!("/tasks/{id}"), Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, request("GET", &format!("/tasks/{id}"), Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_owners_get_forbidden() {
        let app = test_app(RecordingChat::default()).await;
        let (_, created) = call(
            &app,
            request(
                "POST",
                "/tasks",
                Some("alice"),
                Some(json!({"description": "Mine", "due_on": "2030-01-01 - 09:00:00"})),
            ),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, _) = call(&app, request("DELETE", &format!("/tasks/{id}"), Some("bob"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, list) = call(&app, request("GET", "/tasks", Some("alice"), None)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_unprocessable() {
        let app = test_app(RecordingChat::default()).await;
        let (status, body) = call(
            &app,
            request(
                "POST",
                "/tasks",
                Some("alice"),
                Some(json!({"description": "Bad date", "due_on": "tomorrow"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "due_on");
    }

    #[tokio::test]
    async fn malformed_id_is_not_found() {
        let app = test_app(RecordingChat::default()).await;
        let (status, _) = call(&app, request("GET", "/tasks/abc123", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn today_lists_only_todays_tasks() {
        let app = test_app(RecordingChat::default()).await;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let (status, _) = call(
            &app,
            request(
                "POST",
                "/tasks",
                Some("alice"),
                Some(json!({"description": "Later", "due_on": "2099-01-01 - 09:00:00"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(
            &app,
            request(
                "POST",
                "/tasks",
                Some("alice"),
                Some(json!({"description": "Today", "due_on": format!("{today} - 12:00:00")})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, request("GET", "/", Some("alice"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["description"], "Today");
    }
}
