mod attachments;
mod common;
mod dependents;
mod intake;
