//! HTTP handlers for `/api/books`.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use catalog_http::error::AppError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::models::{Book, BookFilter, BookPage, PageRequest};
use super::store::BookStore;
use super::validation;

/// Routes mounted under `/api/books`.
pub fn router(store: BookStore) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(store)
}

/// Raw listing parameters. Numbers arrive as text so that garbage falls back
/// to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub search: Option<String>,
}

impl ListParams {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(parse_count(&self.page), parse_count(&self.per_page))
    }

    fn filter(&self) -> BookFilter {
        BookFilter {
            author: non_blank(&self.author),
            genre: non_blank(&self.genre),
            search: non_blank(&self.search),
        }
    }
}

/// Negative numbers clamp to zero; anything unparseable is treated as absent.
fn parse_count(raw: &Option<String>) -> Option<u32> {
    let raw = raw.as_deref()?.trim();
    match raw.parse::<i64>() {
        Ok(value) => Some(u32::try_from(value.max(0)).unwrap_or(u32::MAX)),
        Err(_) => None,
    }
}

fn non_blank(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn list_books(
    State(store): State<BookStore>,
    Query(params): Query<ListParams>,
) -> Result<Json<BookPage>, AppError> {
    let page = store.list(&params.filter(), params.page_request()).await?;
    Ok(Json(page))
}

async fn get_book(
    State(store): State<BookStore>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    store
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("resource not found"))
}

async fn create_book(
    State(store): State<BookStore>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let Json(body) = body?;
    let new_book = validation::parse_new_book(&body)?;

    let book = store.create(new_book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(store): State<BookStore>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let patch = validation::parse_patch(&body)?;

    let book = store.update(id, patch).await?;
    Ok(Json(book))
}

async fn delete_book(
    State(store): State<BookStore>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(id) = id?;
    store.delete(id).await?;
    Ok(Json(json!({ "message": "Book deleted successfully" })))
}
