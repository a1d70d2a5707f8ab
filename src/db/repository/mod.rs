pub mod box_repository;
pub mod client_repository;
pub mod notification_repository;

pub use box_repository::BoxRepository;
pub use client_repository::ClientRepository;
pub use notification_repository::NotificationRepository;

/// Whether a sqlx error is a unique-index violation. Duplicate inserts are a
/// normal outcome for boxes (create-or-retrieve) and notifications
/// (duplicate suppression), so callers turn this case into `None` instead of
/// propagating it.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    // A pool with more than one connection to sqlite::memory: would hand out
    // independent empty databases.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
