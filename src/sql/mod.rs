//! Every SQL statement the crate issues, one module per operation.

pub(crate) mod acquire_job;
pub(crate) mod count_jobs;
pub(crate) mod delete_jobs;
pub(crate) mod init_queue;
pub(crate) mod insert_job;
pub(crate) mod update_job;
