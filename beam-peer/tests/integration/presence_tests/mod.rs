pub mod test_duplicate_join_updates_record;
pub mod test_shutdown_leaves_presence;
