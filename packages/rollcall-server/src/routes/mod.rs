pub(crate) mod enrollments;
pub(crate) mod events;
pub(crate) mod index;
pub(crate) mod users;
