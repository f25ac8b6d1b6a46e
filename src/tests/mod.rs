//! Integration-style tests driving a full `Logger` end to end, one file per
//! scenario family.

mod channel_tests;
mod redaction_tests;
