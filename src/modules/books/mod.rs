pub mod models;
pub mod routes;
pub mod store;
pub mod validation;

use async_trait::async_trait;
use axum::Router;
use catalog_db::Db;
use catalog_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use store::BookStore;

/// Books module: the catalog's only resource
pub struct BooksModule {
    store: BookStore,
}

impl BooksModule {
    pub fn new(db: Db) -> Self {
        Self {
            store: BookStore::new(db),
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.store.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: r#"
                CREATE TABLE books (
                    id               INTEGER PRIMARY KEY AUTOINCREMENT,
                    title            TEXT    NOT NULL,
                    author           TEXT    NOT NULL,
                    isbn             TEXT    UNIQUE,
                    genre            TEXT,
                    publication_year INTEGER,
                    description      TEXT,
                    title_folded     TEXT    NOT NULL,
                    author_folded    TEXT    NOT NULL,
                    created_at       TEXT    NOT NULL,
                    updated_at       TEXT    NOT NULL
                );
                CREATE INDEX books_genre_idx  ON books (genre);
                CREATE INDEX books_author_idx ON books (author);
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn book_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Book" }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    })
}

fn query_parameter(name: &str, description: &str) -> serde_json::Value {
    json!({
        "name": name,
        "in": "query",
        "required": false,
        "description": description,
        "schema": { "type": "string" }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let book_body = |schema: &str| {
        json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "$ref": format!("#/components/schemas/{schema}") }
                }
            }
        })
    };

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": [
                        query_parameter("page", "Page number, default 1"),
                        query_parameter("per_page", "Page size, default 10, at most 100"),
                        query_parameter("author", "Case-insensitive author substring"),
                        query_parameter("genre", "Exact genre"),
                        query_parameter("search", "Case-insensitive title or author substring")
                    ],
                    "responses": {
                        "200": {
                            "description": "One page of books",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/BookPage" }
                                }
                            }
                        }
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": book_body("CreateBook"),
                    "responses": {
                        "201": book_response("Book created"),
                        "400": error_response("Invalid input"),
                        "409": error_response("ISBN already in use"),
                        "500": error_response("Internal server error")
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": book_response("The book"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Update a book; only the supplied fields change",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": book_body("UpdateBook"),
                    "responses": {
                        "200": book_response("Book updated"),
                        "400": error_response("Invalid input"),
                        "404": error_response("Book not found"),
                        "409": error_response("ISBN already in use"),
                        "500": error_response("Internal server error")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": {
                            "description": "Book deleted",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "message": { "type": "string" } }
                                    }
                                }
                            }
                        },
                        "404": error_response("Book not found"),
                        "500": error_response("Internal server error")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "title": { "type": "string", "maxLength": 200 },
                        "author": { "type": "string", "maxLength": 100 },
                        "isbn": { "type": "string", "nullable": true, "minLength": 13, "maxLength": 13 },
                        "genre": { "type": "string", "nullable": true, "maxLength": 50 },
                        "publication_year": { "type": "integer", "nullable": true, "minimum": 0, "maximum": 9999 },
                        "description": { "type": "string", "nullable": true },
                        "created_at": { "type": "string", "format": "date-time" },
                        "updated_at": { "type": "string", "format": "date-time" }
                    },
                    "required": ["id", "title", "author", "created_at", "updated_at"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "maxLength": 200 },
                        "author": { "type": "string", "maxLength": 100 },
                        "isbn": { "type": "string", "nullable": true, "minLength": 13, "maxLength": 13 },
                        "genre": { "type": "string", "nullable": true, "maxLength": 50 },
                        "publication_year": { "type": "integer", "nullable": true, "minimum": 0, "maximum": 9999 },
                        "description": { "type": "string", "nullable": true }
                    },
                    "required": ["title", "author"]
                },
                "UpdateBook": {
                    "type": "object",
                    "description": "Any subset of the CreateBook fields",
                    "properties": {
                        "title": { "type": "string", "maxLength": 200 },
                        "author": { "type": "string", "maxLength": 100 },
                        "isbn": { "type": "string", "nullable": true, "minLength": 13, "maxLength": 13 },
                        "genre": { "type": "string", "nullable": true, "maxLength": 50 },
                        "publication_year": { "type": "integer", "nullable": true, "minimum": 0, "maximum": 9999 },
                        "description": { "type": "string", "nullable": true }
                    }
                },
                "BookPage": {
                    "type": "object",
                    "properties": {
                        "books": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Book" }
                        },
                        "pagination": {
                            "type": "object",
                            "properties": {
                                "page": { "type": "integer" },
                                "per_page": { "type": "integer" },
                                "total_pages": { "type": "integer" },
                                "total_items": { "type": "integer" },
                                "has_next": { "type": "boolean" },
                                "has_prev": { "type": "boolean" }
                            }
                        }
                    },
                    "required": ["books", "pagination"]
                }
            }
        }
    })
}

/// Create a new instance of the books module over the shared store handle
pub fn create_module(db: Db) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(db))
}
