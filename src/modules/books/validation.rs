//! Request body validation for the books endpoints.
//!
//! Bodies are inspected as raw JSON maps rather than deserialized into
//! structs, so a key that is absent can be told apart from one set to `null`
//! and every failure names the offending field.

use catalog_http::error::AppError;
use serde_json::{Map, Value};
use thiserror::Error;

use super::models::{BookPatch, NewBook};

pub const TITLE_MAX: usize = 200;
pub const AUTHOR_MAX: usize = 100;
pub const GENRE_MAX: usize = 50;
pub const ISBN_LEN: usize = 13;
pub const YEAR_MIN: i64 = 0;
pub const YEAR_MAX: i64 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.field, err.message)
    }
}

/// Validate a `POST /books` body.
pub fn parse_new_book(body: &Value) -> Result<NewBook, ValidationError> {
    let fields = as_object(body)?;

    Ok(NewBook {
        title: required_text(fields, "title", TITLE_MAX)?,
        author: required_text(fields, "author", AUTHOR_MAX)?,
        isbn: isbn(fields)?.flatten(),
        genre: optional_text(fields, "genre", Some(GENRE_MAX))?.flatten(),
        publication_year: publication_year(fields)?.flatten(),
        description: optional_text(fields, "description", None)?.flatten(),
    })
}

/// Validate a `PUT /books/{id}` body; only keys present are validated.
pub fn parse_patch(body: &Value) -> Result<BookPatch, ValidationError> {
    let fields = as_object(body)?;

    let title = if fields.contains_key("title") {
        Some(required_text(fields, "title", TITLE_MAX)?)
    } else {
        None
    };
    let author = if fields.contains_key("author") {
        Some(required_text(fields, "author", AUTHOR_MAX)?)
    } else {
        None
    };

    Ok(BookPatch {
        title,
        author,
        isbn: isbn(fields)?,
        genre: optional_text(fields, "genre", Some(GENRE_MAX))?,
        publication_year: publication_year(fields)?,
        description: optional_text(fields, "description", None)?,
    })
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::new("body", "request body must be a JSON object"))
}

fn required_text(
    fields: &Map<String, Value>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = match fields.get(field) {
        None | Some(Value::Null) => {
            return Err(ValidationError::new(field, format!("{field} is required")))
        }
        Some(value) => value,
    };

    let text = string_value(field, value)?;
    if text.is_empty() {
        return Err(ValidationError::new(
            field,
            format!("{field} must not be empty"),
        ));
    }
    check_max(field, &text, max)?;
    Ok(text)
}

/// `None` when absent, `Some(None)` for `null` or blank text.
fn optional_text(
    fields: &Map<String, Value>,
    field: &'static str,
    max: Option<usize>,
) -> Result<Option<Option<String>>, ValidationError> {
    let value = match fields.get(field) {
        None => return Ok(None),
        Some(Value::Null) => return Ok(Some(None)),
        Some(value) => value,
    };

    let text = string_value(field, value)?;
    if text.is_empty() {
        return Ok(Some(None));
    }
    if let Some(max) = max {
        check_max(field, &text, max)?;
    }
    Ok(Some(Some(text)))
}

fn isbn(fields: &Map<String, Value>) -> Result<Option<Option<String>>, ValidationError> {
    let isbn = optional_text(fields, "isbn", None)?;
    if let Some(Some(code)) = &isbn {
        if code.chars().count() != ISBN_LEN {
            return Err(ValidationError::new(
                "isbn",
                format!("isbn must be exactly {ISBN_LEN} characters"),
            ));
        }
    }
    Ok(isbn)
}

fn publication_year(fields: &Map<String, Value>) -> Result<Option<Option<i32>>, ValidationError> {
    let value = match fields.get("publication_year") {
        None => return Ok(None),
        Some(Value::Null) => return Ok(Some(None)),
        Some(value) => value,
    };

    match value.as_i64() {
        Some(year) if (YEAR_MIN..=YEAR_MAX).contains(&year) => {
            // Range check above guarantees the value fits.
            Ok(Some(Some(year as i32)))
        }
        _ => Err(ValidationError::new(
            "publication_year",
            format!("publication_year must be an integer between {YEAR_MIN} and {YEAR_MAX}"),
        )),
    }
}

/// Trimmed string content, or an error naming the field.
fn string_value(field: &'static str, value: &Value) -> Result<String, ValidationError> {
    value
        .as_str()
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ValidationError::new(field, format!("{field} must be a string")))
}

fn check_max(field: &'static str, text: &str, max: usize) -> Result<(), ValidationError> {
    if text.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("{field} must be at most {max} characters"),
        ));
    }
    Ok(())
}
