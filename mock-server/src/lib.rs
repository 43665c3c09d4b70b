use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub published: bool,
}

#[derive(Deserialize)]
pub struct CreateArticle {
    pub title: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize)]
pub struct UpdateArticle {
    pub title: Option<String>,
    pub published: Option<bool>,
}

/// Error body returned with every non-2xx status.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiMessage {
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hits {
    pub hits: u64,
}

#[derive(Deserialize)]
pub struct Pagination {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Article>>>;

#[derive(Clone, Default)]
pub struct AppState {
    pub db: Db,
    pub hits: Arc<AtomicU64>,
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/news", get(list_articles).post(create_article))
        .route(
            "/news/{id}",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/text", get(text))
        .route("/echo", post(echo).put(echo).delete(echo))
        .route("/headers", get(request_headers))
        .route("/files/{size}", get(file))
        .route("/status/{code}", get(status))
        .route("/counter", get(counter))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn not_found(id: Uuid) -> (StatusCode, Json<ApiMessage>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiMessage {
            message: format!("article {id} not found"),
        }),
    )
}

async fn list_articles(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Json<Vec<Article>> {
    let articles = state.db.read().await;
    let mut all: Vec<Article> = articles.values().cloned().collect();
    all.sort_by(|a, b| a.title.cmp(&b.title));

    let limit = page.limit.unwrap_or(all.len().max(1));
    let skip = page.page.unwrap_or(1).saturating_sub(1) * limit;
    Json(all.into_iter().skip(skip).take(limit).collect())
}

async fn create_article(
    State(state): State<AppState>,
    Json(input): Json<CreateArticle>,
) -> (StatusCode, Json<Article>) {
    let article = Article {
        id: Uuid::new_v4(),
        title: input.title,
        published: input.published,
    };
    state.db.write().await.insert(article.id, article.clone());
    (StatusCode::CREATED, Json(article))
}

async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>, (StatusCode, Json<ApiMessage>)> {
    let articles = state.db.read().await;
    articles.get(&id).cloned().map(Json).ok_or_else(|| not_found(id))
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateArticle>,
) -> Result<Json<Article>, (StatusCode, Json<ApiMessage>)> {
    let mut articles = state.db.write().await;
    let article = articles.get_mut(&id).ok_or_else(|| not_found(id))?;
    if let Some(title) = input.title {
        article.title = title;
    }
    if let Some(published) = input.published {
        article.published = published;
    }
    Ok(Json(article.clone()))
}

async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ApiMessage>)> {
    let mut articles = state.db.write().await;
    articles
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| not_found(id))
}

async fn text() -> &'static str {
    "hello from mock-server"
}

/// Send the request body back with the request's content type.
async fn echo(headers: HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn request_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect(),
    )
}

/// `size` deterministic bytes, so clients can verify what they saved.
pub fn file_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn file(Path(size): Path<usize>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file_bytes(size),
    )
}

async fn status(Path(code): Path<u16>) -> (StatusCode, Json<ApiMessage>) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ApiMessage {
            message: format!("status {}", status.as_u16()),
        }),
    )
}

async fn counter(State(state): State<AppState>) -> Json<Hits> {
    let hits = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    Json(Hits { hits })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_serializes_to_json() {
        let article = Article {
            id: Uuid::nil(),
            title: "Test".to_string(),
            published: false,
        };
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["title"], "Test");
        assert_eq!(json["published"], false);
    }

    #[test]
    fn create_article_defaults_published_to_false() {
        let input: CreateArticle = serde_json::from_str(r#"{"title":"Draft"}"#).unwrap();
        assert_eq!(input.title, "Draft");
        assert!(!input.published);
    }

    #[test]
    fn create_article_rejects_missing_title() {
        let result: Result<CreateArticle, _> = serde_json::from_str(r#"{"published":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_article_all_fields_optional() {
        let input: UpdateArticle = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.title.is_none());
        assert!(input.published.is_none());
    }

    #[test]
    fn file_bytes_are_deterministic() {
        let bytes = file_bytes(600);
        assert_eq!(bytes.len(), 600);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[251], 0);
        assert_eq!(bytes[252], 1);
    }
}
