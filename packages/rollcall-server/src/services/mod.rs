pub mod enrollments;
pub mod events;
pub mod users;

use rollcall_core::{Page, PageQuery};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, Select, SqlErr};

use crate::error::{AppError, AppResult};

/// 按页查询，页码从 0 开始
pub(crate) async fn fetch_page<C, E>(
    db: &C,
    select: Select<E>,
    query: PageQuery,
) -> AppResult<Page<E::Model>>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync,
{
    let size = query.page_size();
    let number = query.page_index();
    number
        .checked_mul(size)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| AppError::Validation(format!("page {number} is out of range")))?;

    let paginator = select.paginate(db, size);
    let totals = paginator.num_items_and_pages().await?;
    let content = paginator.fetch_page(number).await?;

    Ok(Page {
        content,
        total_pages: totals.number_of_pages,
        total_elements: totals.number_of_items,
        size,
        number,
    })
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
