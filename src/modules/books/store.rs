//! Data access for the `books` table.

use catalog_db::Db;
use catalog_http::error::AppError;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use time::OffsetDateTime;

use super::models::{Book, BookFilter, BookPage, BookPatch, NewBook, PageRequest, Pagination};

const COLUMNS: &str =
    "id, title, author, isbn, genre, publication_year, description, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("book {0} not found")]
    NotFound(i64),

    #[error("a book with {field} '{value}' already exists")]
    DuplicateKey { field: &'static str, value: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found("resource not found"),
            StoreError::DuplicateKey { field, value } => {
                AppError::conflict(format!("a book with {field} '{value}' already exists"))
            }
            StoreError::Database(source) => AppError::Internal(source.into()),
        }
    }
}

/// Resource model over the books table. Cheap to clone; every clone shares
/// the same pool.
#[derive(Clone, Debug)]
pub struct BookStore {
    db: Db,
}

impl BookStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Book>, StoreError> {
        let book = sqlx::query_as(&format!("SELECT {COLUMNS} FROM books WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(book)
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StoreError> {
        let book = sqlx::query_as(&format!("SELECT {COLUMNS} FROM books WHERE isbn = ?"))
            .bind(isbn)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(book)
    }

    /// Books whose title or author contains `text`, ignoring case.
    pub async fn search(&self, text: &str) -> Result<Vec<Book>, StoreError> {
        self.fetch_all(&BookFilter {
            search: Some(text.to_string()),
            ..BookFilter::default()
        })
        .await
    }

    /// Books whose genre equals `genre` exactly (case-sensitive).
    pub async fn list_by_genre(&self, genre: &str) -> Result<Vec<Book>, StoreError> {
        self.fetch_all(&BookFilter {
            genre: Some(genre.to_string()),
            ..BookFilter::default()
        })
        .await
    }

    /// One page of the filtered listing, ordered by id.
    pub async fn list(&self, filter: &BookFilter, page: PageRequest) -> Result<BookPage, StoreError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM books");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.db.pool()).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM books"));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let books = select.build_query_as().fetch_all(self.db.pool()).await?;

        Ok(BookPage {
            books,
            pagination: Pagination::new(page, u64::try_from(total).unwrap_or_default()),
        })
    }

    pub async fn create(&self, new: NewBook) -> Result<Book, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.db.pool().begin().await?;

        // Dropping `tx` on any error path rolls the transaction back.
        let book: Book = sqlx::query_as(&format!(
            "INSERT INTO books (title, author, isbn, genre, publication_year, description, \
             title_folded, author_folded, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.author)
        .bind(&new.isbn)
        .bind(&new.genre)
        .bind(new.publication_year)
        .bind(&new.description)
        .bind(fold_case(&new.title))
        .bind(fold_case(&new.author))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| duplicate_isbn(err, new.isbn.as_deref()))?;

        tx.commit().await?;

        tracing::info!(book_id = book.id, "book created");
        Ok(book)
    }

    /// Apply `patch` in one `UPDATE ... RETURNING` statement, so the write
    /// lock is taken up front instead of upgraded from a read.
    pub async fn update(&self, id: i64, patch: BookPatch) -> Result<Book, StoreError> {
        let isbn = patch.isbn.clone().flatten();

        let mut update = QueryBuilder::<Sqlite>::new("UPDATE books SET ");
        let mut columns = update.separated(", ");
        if let Some(title) = patch.title {
            columns.push("title_folded = ").push_bind_unseparated(fold_case(&title));
            columns.push("title = ").push_bind_unseparated(title);
        }
        if let Some(author) = patch.author {
            columns.push("author_folded = ").push_bind_unseparated(fold_case(&author));
            columns.push("author = ").push_bind_unseparated(author);
        }
        if let Some(isbn) = patch.isbn {
            columns.push("isbn = ").push_bind_unseparated(isbn);
        }
        if let Some(genre) = patch.genre {
            columns.push("genre = ").push_bind_unseparated(genre);
        }
        if let Some(year) = patch.publication_year {
            columns.push("publication_year = ").push_bind_unseparated(year);
        }
        if let Some(description) = patch.description {
            columns.push("description = ").push_bind_unseparated(description);
        }
        columns
            .push("updated_at = ")
            .push_bind_unseparated(OffsetDateTime::now_utc());
        update
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {COLUMNS}"));

        let book: Book = update
            .build_query_as::<Book>()
            .fetch_optional(self.db.pool())
            .await
            .map_err(|err| duplicate_isbn(err, isbn.as_deref()))?
            .ok_or(StoreError::NotFound(id))?;

        tracing::info!(book_id = id, "book updated");
        Ok(book)
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        tx.commit().await?;

        tracing::info!(book_id = id, "book deleted");
        Ok(())
    }

    async fn fetch_all(&self, filter: &BookFilter) -> Result<Vec<Book>, StoreError> {
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM books"));
        push_filters(&mut select, filter);
        select.push(" ORDER BY id");
        Ok(select.build_query_as().fetch_all(self.db.pool()).await?)
    }
}

/// Append a `WHERE` clause for every filter that is set.
///
/// Text filters compare case-folded needles against the `*_folded` columns,
/// which hold the Unicode lowercase of `title` and `author`.
fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &BookFilter) {
    let mut separator = " WHERE ";

    if let Some(author) = &filter.author {
        query
            .push(separator)
            .push("instr(author_folded, ")
            .push_bind(fold_case(author))
            .push(") > 0");
        separator = " AND ";
    }
    if let Some(genre) = &filter.genre {
        query.push(separator).push("genre = ").push_bind(genre.clone());
        separator = " AND ";
    }
    if let Some(text) = &filter.search {
        let needle = fold_case(text);
        query
            .push(separator)
            .push("(instr(title_folded, ")
            .push_bind(needle.clone())
            .push(") > 0 OR instr(author_folded, ")
            .push_bind(needle)
            .push(") > 0)");
    }
}

/// Case-insensitive comparison key; SQLite's own `lower()` only folds ASCII.
fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Map a unique violation to `DuplicateKey`; `isbn` is the only unique column.
fn duplicate_isbn(err: sqlx::Error, isbn: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey {
                field: "isbn",
                value: isbn.unwrap_or_default().to_string(),
            };
        }
    }
    StoreError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::BooksModule;

    async fn store() -> BookStore {
        let db = Db::in_memory().await.unwrap();
        let migrations: Vec<(String, catalog_kernel::Migration)> =
            catalog_kernel::Module::migrations(&BooksModule::new(db.clone()))
                .into_iter()
                .map(|migration| ("books".to_string(), migration))
                .collect();
        catalog_db::migrate::run(&db, &migrations).await.unwrap();
        BookStore::new(db)
    }

    fn new_book(title: &str, author: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: author.to_string(),
            ..NewBook::default()
        }
    }

    #[test]
    fn fold_case_lowercases_beyond_ascii() {
        assert_eq!(fold_case("JOSÉ Saramago"), "josé saramago");
        assert_eq!(fold_case("ÅNGSTRÖM"), "ångström");
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let store = store().await;
        let book = store.create(new_book("Dune", "Frank Herbert")).await.unwrap();

        assert!(book.id > 0);
        assert_eq!(book.created_at, book.updated_at);
        assert_eq!(store.find_by_id(book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn duplicate_isbn_is_reported_and_rolled_back() {
        let store = store().await;
        let mut first = new_book("1984", "George Orwell");
        first.isbn = Some("9780451524935".to_string());
        store.create(first.clone()).await.unwrap();

        let err = store.create(first).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { field: "isbn", .. }));

        let page = store
            .list(&BookFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total_items, 1);
    }

    #[tokio::test]
    async fn find_by_isbn_matches_exactly() {
        let store = store().await;
        let mut book = new_book("The Hobbit", "J.R.R. Tolkien");
        book.isbn = Some("9780618640157".to_string());
        let created = store.create(book).await.unwrap();

        assert_eq!(
            store.find_by_isbn("9780618640157").await.unwrap().map(|b| b.id),
            Some(created.id)
        );
        assert_eq!(store.find_by_isbn("0000000000000").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_matches_title_or_author_ignoring_case() {
        let store = store().await;
        store.create(new_book("The Hobbit", "J.R.R. Tolkien")).await.unwrap();
        store.create(new_book("Tolkien: A Biography", "Humphrey Carpenter")).await.unwrap();
        store.create(new_book("Dune", "Frank Herbert")).await.unwrap();

        let found = store.search("TOLKIEN").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.search("50%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let store = store().await;
        store.create(new_book("Blindness", "José Saramago")).await.unwrap();

        assert_eq!(store.search("JOSÉ").await.unwrap().len(), 1);
        assert_eq!(store.search("saramago").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_by_genre_is_case_sensitive() {
        let store = store().await;
        let mut fantasy = new_book("The Hobbit", "J.R.R. Tolkien");
        fantasy.genre = Some("Fantasy".to_string());
        store.create(fantasy).await.unwrap();

        assert_eq!(store.list_by_genre("Fantasy").await.unwrap().len(), 1);
        assert!(store.list_by_genre("fantasy").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_combines_filters_and_paginates() {
        let store = store().await;
        for n in 0..12 {
            let mut book = new_book(&format!("Volume {n}"), "Ursula K. Le Guin");
            book.genre = Some("Fantasy".to_string());
            store.create(book).await.unwrap();
        }
        store.create(new_book("Dune", "Frank Herbert")).await.unwrap();

        let filter = BookFilter {
            author: Some("le guin".to_string()),
            genre: Some("Fantasy".to_string()),
            search: None,
        };
        let page = store
            .list(&filter, PageRequest::new(Some(2), Some(5)))
            .await
            .unwrap();

        assert_eq!(page.books.len(), 5);
        assert_eq!(page.books[0].title, "Volume 5");
        assert_eq!(page.pagination.total_items, 12);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[tokio::test]
    async fn update_applies_patch_and_bumps_updated_at() {
        let store = store().await;
        let created = store.create(new_book("Dune", "Frank Herbert")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = store
            .update(
                created.id,
                BookPatch {
                    genre: Some(Some("Science Fiction".to_string())),
                    ..BookPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.genre.as_deref(), Some("Science Fiction"));
        assert_eq!(updated.title, created.title);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_clears_explicit_nulls_and_refolds_author() {
        let store = store().await;
        let mut book = new_book("Dune", "Frank Herbert");
        book.isbn = Some("9780441172719".to_string());
        book.publication_year = Some(1965);
        let created = store.create(book).await.unwrap();

        let updated = store
            .update(
                created.id,
                BookPatch {
                    author: Some("Émile Zola".to_string()),
                    isbn: Some(None),
                    ..BookPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.isbn, None);
        assert_eq!(updated.publication_year, Some(1965));
        assert_eq!(updated.title, "Dune");
        assert_eq!(store.search("ÉMILE").await.unwrap().len(), 1);
        assert!(store.search("herbert").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_to_taken_isbn_is_a_duplicate() {
        let store = store().await;
        let mut first = new_book("1984", "George Orwell");
        first.isbn = Some("9780451524935".to_string());
        store.create(first).await.unwrap();
        let second = store.create(new_book("Dune", "Frank Herbert")).await.unwrap();

        let err = store
            .update(
                second.id,
                BookPatch {
                    isbn: Some(Some("9780451524935".to_string())),
                    ..BookPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { field: "isbn", .. }));
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids_are_not_found() {
        let store = store().await;

        assert!(matches!(
            store.update(42, BookPatch::default()).await,
            Err(StoreError::NotFound(42))
        ));
        assert!(matches!(store.delete(42).await, Err(StoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = store().await;
        let created = store.create(new_book("Dune", "Frank Herbert")).await.unwrap();

        store.delete(created.id).await.unwrap();
        assert_eq!(store.find_by_id(created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_database_errors() {
        let db = Db::in_memory().await.unwrap();
        let store = BookStore::new(db);

        // No migrations applied, so the table is missing.
        let err = store.create(new_book("Dune", "Frank Herbert")).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
