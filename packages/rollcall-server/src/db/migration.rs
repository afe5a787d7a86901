pub(crate) mod m00001_create_all_tables;
pub(crate) mod m00002_enrollment_constraints;
