//! Maps `sqlx::Error` onto the shared error taxonomy at the store boundary.

use fortune_shared::FortuneError;

pub(crate) fn map_sqlx_error(context: &str, err: sqlx::Error) -> FortuneError {
    match &err {
        sqlx::Error::RowNotFound => FortuneError::NotFound(format!("{context}: no matching row")),
        _ => FortuneError::Internal(format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = map_sqlx_error("get_task", sqlx::Error::RowNotFound);
        assert_eq!(err.category(), fortune_shared::ErrorCategory::NotFound);
    }
}
