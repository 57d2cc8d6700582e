//! Cursor pagination over snowflake oids.
//!
//! Oids grow with creation time, so `oid DESC` is newest-first. Cursors are the public ids of the
//! listed rows; handlers resolve them to oids and apply the [`Bound`] this module hands back.

use crate::error::AppError;
use crate::models::{ListQuery, ListResponse, PaginationResponse};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn reversed(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Gt(i64),
    Lt(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Start,
    After,
    Before,
}

#[derive(Debug, Clone)]
pub struct PageParams {
    pub limit: i64,
    pub order: SortOrder,
    cursor: Option<String>,
    direction: Direction,
}

impl PageParams {
    pub fn from_query(query: ListQuery, default_order: SortOrder) -> Result<Self, AppError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let order = match query.order.as_deref() {
            None => default_order,
            Some("asc") => SortOrder::Asc,
            Some("desc") => SortOrder::Desc,
            Some(other) => {
                return Err(AppError::BadRequest(format!(
                    "Invalid order '{}', expected 'asc' or 'desc'",
                    other
                )))
            }
        };

        let (cursor, direction) = match (query.after, query.before) {
            (Some(_), Some(_)) => {
                return Err(AppError::BadRequest(
                    "Only one of 'before' and 'after' may be given".to_string(),
                ))
            }
            (Some(after), None) => (Some(after), Direction::After),
            (None, Some(before)) => (Some(before), Direction::Before),
            (None, None) => (None, Direction::Start),
        };

        Ok(Self {
            limit,
            order,
            cursor,
            direction,
        })
    }

    /// Public id of the row the page is anchored on, if any.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Sort order to run the query in. Paging backwards walks the rows in reverse and
    /// [`PageParams::finish`] flips them back.
    pub fn query_order(&self) -> SortOrder {
        match self.direction {
            Direction::Before => self.order.reversed(),
            _ => self.order,
        }
    }

    /// Oid filter for the resolved cursor.
    pub fn bound(&self, cursor_oid: Option<i64>) -> Option<Bound> {
        cursor_oid.map(|oid| match self.query_order() {
            SortOrder::Asc => Bound::Gt(oid),
            SortOrder::Desc => Bound::Lt(oid),
        })
    }

    /// Rows to fetch: one extra to learn whether another page exists.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    pub fn finish<T>(&self, mut rows: Vec<T>) -> (Vec<T>, PaginationResponse) {
        let has_more = rows.len() as i64 > self.limit;
        rows.truncate(self.limit as usize);

        let pagination = match self.direction {
            Direction::Start => PaginationResponse {
                has_more_before: false,
                has_more_after: has_more,
            },
            Direction::After => PaginationResponse {
                has_more_before: true,
                has_more_after: has_more,
            },
            Direction::Before => {
                rows.reverse();
                PaginationResponse {
                    has_more_before: has_more,
                    has_more_after: true,
                }
            }
        };

        (rows, pagination)
    }

    pub fn respond<T, U, F>(&self, rows: Vec<T>, f: F) -> Result<ListResponse<U>, AppError>
    where
        F: FnMut(T) -> Result<U, AppError>,
    {
        let (rows, pagination) = self.finish(rows);
        let items = rows.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResponse { items, pagination })
    }
}
